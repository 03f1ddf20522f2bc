//! Decoding for map-file symbols that embed their defining module inline,
//! in the form `[module-path] symbol-text`. Symbols of this shape come from
//! `.map` files generated for managed (ngen/crossgen) code.

/// Split `[module-path] symbol-text` into `(module, symbol)`.
///
/// The scan walks the input word by word; the first word enclosed in square
/// brackets names the module, and everything after it (trimmed) is the
/// symbol. Inputs without a bracketed word decode to
/// `(fallback_module, symbol)` unchanged.
pub fn decode_map_symbol<'a>(symbol: &'a str, fallback_module: &'a str) -> (&'a str, &'a str) {
    let mut rest = symbol;
    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        let (word, after) = match trimmed.split_once(' ') {
            Some((word, after)) => (word, after),
            None => (trimmed, ""),
        };
        if let Some(module) = word.strip_prefix('[').and_then(|w| w.strip_suffix(']')) {
            return (module, after.trim());
        }
        rest = after;
    }
    (fallback_module, symbol)
}
