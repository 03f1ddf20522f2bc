use std::io::Read;

use crate::cursor::ByteCursor;
use crate::error::Error;
use crate::event::Frame;
use crate::map_symbol::decode_map_symbol;
use crate::symbol_index::{basename, SymbolIndex};

/// Read one stack-frame line: `<hexaddr> <symbol-text> (<module-text>)`.
///
/// The symbol is everything up to the last `(` of the line, the module the
/// rest; both are trimmed and lose at most one matched outer pair of `()`
/// or `[]`. Modules that are `.map` files can carry the real module inline
/// in the symbol (`[module] symbol`). The module is normalized to its base
/// name, and frames whose module or symbol is `unknown` get one resolution
/// attempt against the symbol index.
pub(crate) fn read_stack_frame<R: Read>(
    cursor: &mut ByteCursor<R>,
    scratch: &mut Vec<u8>,
    pid: i32,
    symbols: Option<&SymbolIndex>,
) -> Result<Frame, Error> {
    cursor.skip_whitespace()?;
    scratch.clear();
    cursor.read_while(|b| !b.is_ascii_whitespace(), scratch)?;
    let address = String::from_utf8_lossy(scratch).into_owned();

    cursor.skip_whitespace()?;
    scratch.clear();
    cursor.read_until(b'\n', scratch)?;
    let line = String::from_utf8_lossy(scratch).into_owned();

    let (symbol_text, module_text) = match line.rfind('(') {
        Some(index) => (&line[..index], &line[index..]),
        None => (&line[..], ""),
    };
    let symbol_text = strip_outer_pair(symbol_text.trim());
    let module_text = strip_outer_pair(module_text.trim());

    let (module, symbol) = if module_text.ends_with(".map") {
        let (module, decoded_symbol) = decode_map_symbol(symbol_text, module_text);
        if decoded_symbol.is_empty() {
            (module, module_text)
        } else {
            (module, decoded_symbol)
        }
    } else {
        (module_text, symbol_text)
    };
    let mut module = basename(module).to_string();
    let mut symbol = symbol.to_string();

    if module == "unknown" || symbol == "unknown" {
        if let Some(index) = symbols {
            if let Some((resolved_module, resolved_symbol)) =
                index.resolve(pid, &module, &address)
            {
                module = basename(&resolved_module).to_string();
                symbol = resolved_symbol;
            }
        }
    }

    Ok(Frame::Stack {
        address,
        module,
        symbol,
    })
}

fn strip_outer_pair(text: &str) -> &str {
    text.strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .or_else(|| text.strip_prefix('[').and_then(|t| t.strip_suffix(']')))
        .unwrap_or(text)
}
