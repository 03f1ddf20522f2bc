use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::str;

use log::{debug, warn};
use memchr::memchr;
use nom::character::complete::space1;
use nom::combinator::{map_res, rest};
use nom::error::{Error as NomError, ErrorKind, ParseError};
use nom::sequence::{terminated, tuple};
use nom::{Err, IResult};
use regex::Regex;

use crate::error::Error;
use crate::interval_map::{IntervalMap, IntervalMapBuilder};
use crate::map_symbol::decode_map_symbol;

/// A container of named byte streams: the side-channel symbol files that
/// ship next to a `perf script` dump, e.g. the entries of an extracted
/// trace archive. The archive format itself is the caller's business; the
/// symbol index only enumerates entries and reads the ones it recognizes.
pub trait SymbolArchive {
    fn entry_names(&self) -> io::Result<Vec<String>>;
    fn read_entry(&mut self, name: &str) -> io::Result<Vec<u8>>;
}

/// In-memory archive, mainly useful for tests and for callers that already
/// hold the decompressed entries.
impl SymbolArchive for HashMap<String, Vec<u8>> {
    fn entry_names(&self) -> io::Result<Vec<String>> {
        Ok(self.keys().cloned().collect())
    }

    fn read_entry(&mut self, name: &str) -> io::Result<Vec<u8>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}

/// An archive backed by the files of a single directory, for traces that
/// have already been extracted to disk.
#[derive(Debug)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryArchive { root: root.into() }
    }
}

impl SymbolArchive for DirectoryArchive {
    fn entry_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn read_entry(&mut self, name: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(name))
    }
}

/// The per-archive symbol registry.
///
/// `module_maps` holds one finalized [`IntervalMap`] per recognized `.map`
/// entry, keyed by the entry's filename without the `.map` extension.
/// `process_guids` maps each `perfinfo-<pid>.map` filename to that process's
/// module-basename → build-guid table. Both tables are filled during
/// construction and read-only afterwards.
#[derive(Debug)]
pub struct SymbolIndex {
    module_maps: HashMap<String, IntervalMap>,
    process_guids: HashMap<String, HashMap<String, String>>,
}

impl SymbolIndex {
    /// Build the index from an archive. Entries whose filename matches
    /// `perf-<pid>.map` or `*.ni.{<guid>}.map` become interval maps; entries
    /// matching `perfinfo-<pid>.map` become guid tables; everything else is
    /// ignored.
    pub fn from_archive<A: SymbolArchive + ?Sized>(archive: &mut A) -> Result<SymbolIndex, Error> {
        let perf_map_name = Regex::new(r"^perf-\d+\.map$").unwrap();
        let ni_map_name = Regex::new(r"^.+\.ni\.\{.+\}\.map$").unwrap();
        let perfinfo_name = Regex::new(r"^perfinfo-\d+\.map$").unwrap();

        let mut module_maps = HashMap::new();
        let mut process_guids = HashMap::new();
        for entry_name in archive.entry_names()? {
            let file_name = basename(&entry_name);
            if perf_map_name.is_match(file_name) || ni_map_name.is_match(file_name) {
                let bytes = archive.read_entry(&entry_name)?;
                let stem = file_name.strip_suffix(".map").unwrap_or(file_name);
                module_maps.insert(stem.to_string(), parse_module_map(&bytes, file_name));
            } else if perfinfo_name.is_match(file_name) {
                let bytes = archive.read_entry(&entry_name)?;
                process_guids.insert(file_name.to_string(), parse_perfinfo(&bytes));
            } else {
                debug!("symbol archive: ignoring entry {entry_name}");
            }
        }
        Ok(SymbolIndex {
            module_maps,
            process_guids,
        })
    }

    /// Resolve `(pid, module, address)` to `(module, symbol)` through the
    /// process's perfinfo guid table and the matching interval map. Any miss
    /// along the way returns `None`; the caller keeps its original fields.
    pub fn resolve(&self, pid: i32, module: &str, address: &str) -> Option<(String, String)> {
        let guids = self.process_guids.get(&format!("perfinfo-{pid}.map"))?;
        let guid = guids.get(module)?;
        let map = self.module_maps.get(&replace_extension(module, guid))?;
        let (symbol, _start) = map.lookup(parse_hex_address(address)?)?;
        // Map symbols can carry their defining module inline; if this one
        // doesn't, it stays attributed to the module we were asked about.
        let (module, symbol) = decode_map_symbol(symbol, module);
        Some((module.to_string(), symbol.to_string()))
    }
}

/// Last path component, treating both `/` and `\` as separators. `Path`
/// can't be used here: Linux module names may contain bytes that are
/// separator or reserved characters on other platforms.
pub(crate) fn basename(path: &str) -> &str {
    match path.rfind(|c| c == '/' || c == '\\') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// `foo.ni.dll` + `{guid}` → `foo.ni.{guid}`: the text after the last `.`
/// is replaced by the guid, forming the key of the module's interval map.
fn replace_extension(module: &str, guid: &str) -> String {
    match module.rfind('.') {
        Some(index) => format!("{}.{guid}", &module[..index]),
        None => format!("{module}.{guid}"),
    }
}

pub(crate) fn parse_hex_address(address: &str) -> Option<u64> {
    let address = address.trim();
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    u64::from_str_radix(digits, 16).ok()
}

/// Returns the first line, excluding trailing `\r*\n`, advancing the input
/// to just after the `\n`.
fn read_line_and_advance<'a>(input: &mut &'a [u8]) -> &'a [u8] {
    let mut line = if let Some(line_break) = memchr(b'\n', input) {
        let line = &input[..line_break];
        *input = &input[(line_break + 1)..];
        line
    } else {
        let line = *input;
        *input = &[];
        line
    };
    while line.last() == Some(&b'\r') {
        line = &line[..(line.len() - 1)];
    }
    line
}

/// Parse `hexStart hexSize symbolText` records into a finalized interval
/// map. Records that don't parse are skipped.
fn parse_module_map(mut input: &[u8], file_name: &str) -> IntervalMap {
    let mut builder = IntervalMapBuilder::new();
    while !input.is_empty() {
        let line = read_line_and_advance(&mut input);
        if line.is_empty() {
            continue;
        }
        match module_map_line(line) {
            Ok((_rest, (start, length, symbol))) => {
                builder.add(start, length, symbol.trim().to_string());
            }
            Err(_) => {
                warn!(
                    "{file_name}: skipping unparseable record {:?}",
                    String::from_utf8_lossy(line)
                );
            }
        }
    }
    builder.finalize()
}

/// Parse `command;arg;arg;…` records. Only `ImageLoad;path;guid;…` is
/// interpreted: it maps the image's basename to its build guid. All other
/// commands are skipped.
fn parse_perfinfo(mut input: &[u8]) -> HashMap<String, String> {
    let mut guids = HashMap::new();
    while !input.is_empty() {
        let line = read_line_and_advance(&mut input);
        let mut fields = str::from_utf8(line).unwrap_or("").split(';');
        if fields.next() != Some("ImageLoad") {
            continue;
        }
        if let (Some(path), Some(guid)) = (fields.next(), fields.next()) {
            guids.insert(basename(path.trim()).to_string(), guid.trim().to_string());
        }
    }
    guids
}

/// Match a hex string of up to 16 digits, parse it to a u64.
fn hex_str_u64(input: &[u8]) -> IResult<&[u8], u64> {
    const MAX_LEN: usize = 16;
    let mut value: u64 = 0;
    let mut digit_count = 0;
    for byte in input.iter().take(MAX_LEN) {
        let digit = match (*byte as char).to_digit(16) {
            Some(digit) => digit,
            None => break,
        };
        value = (value << 4) | digit as u64;
        digit_count += 1;
    }
    if digit_count == 0 {
        return Err(Err::Error(NomError::from_error_kind(
            input,
            ErrorKind::HexDigit,
        )));
    }
    Ok((&input[digit_count..], value))
}

// Matches a `hexStart hexSize symbolText` record.
fn module_map_line(input: &[u8]) -> IResult<&[u8], (u64, u64, &str)> {
    let (input, (start, length, symbol)) = tuple((
        terminated(hex_str_u64, space1),
        terminated(hex_str_u64, space1),
        map_res(rest, str::from_utf8),
    ))(input)?;
    Ok((input, (start, length, symbol)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn archive() -> HashMap<String, Vec<u8>> {
        let mut archive = HashMap::new();
        archive.insert(
            "perfinfo-42.map".to_string(),
            b"ImageLoad;C:\\Windows\\assembly\\foo.ni.dll;{6b8f8b66};\n\
              KernelImageLoad;whatever;x\n\
              ImageLoad;/usr/lib/libbar.so; {deadbeef} ;extra\n"
                .to_vec(),
        );
        archive.insert(
            "foo.ni.{6b8f8b66}.map".to_string(),
            b"400000 1000 [corlib.dll] Foo::Bar\n401000 200 plain_method\nbogus line\n".to_vec(),
        );
        archive.insert(
            "perf-42.map".to_string(),
            b"7f0000001000 40 jitted_frame\n".to_vec(),
        );
        archive.insert("stacks.txt".to_string(), b"unrelated".to_vec());
        archive
    }

    #[test]
    fn construction_classifies_entries() {
        let index = SymbolIndex::from_archive(&mut archive()).unwrap();
        assert!(index.module_maps.contains_key("foo.ni.{6b8f8b66}"));
        assert!(index.module_maps.contains_key("perf-42"));
        assert!(!index.module_maps.contains_key("stacks"));
        let guids = &index.process_guids["perfinfo-42.map"];
        assert_eq!(guids["foo.ni.dll"], "{6b8f8b66}");
        assert_eq!(guids["libbar.so"], "{deadbeef}");
        assert_eq!(guids.len(), 2);
    }

    #[test]
    fn resolve_through_guid_and_interval_map() {
        let index = SymbolIndex::from_archive(&mut archive()).unwrap();
        assert_eq!(
            index.resolve(42, "foo.ni.dll", "0x400010"),
            Some(("corlib.dll".to_string(), "Foo::Bar".to_string()))
        );
        // A record without an embedded module keeps the module we asked for.
        assert_eq!(
            index.resolve(42, "foo.ni.dll", "401080"),
            Some(("foo.ni.dll".to_string(), "plain_method".to_string()))
        );
    }

    #[test]
    fn resolve_misses_are_none() {
        let index = SymbolIndex::from_archive(&mut archive()).unwrap();
        // Unknown pid.
        assert_eq!(index.resolve(7, "foo.ni.dll", "400010"), None);
        // Module not in the perfinfo table.
        assert_eq!(index.resolve(42, "nosuch.dll", "400010"), None);
        // Module known but no matching map entry (libbar's map is absent).
        assert_eq!(index.resolve(42, "libbar.so", "400010"), None);
        // Address outside every interval.
        assert_eq!(index.resolve(42, "foo.ni.dll", "500000"), None);
        // Unparseable address.
        assert_eq!(index.resolve(42, "foo.ni.dll", "zz"), None);
    }

    #[test]
    fn replace_extension_swaps_the_suffix() {
        assert_eq!(replace_extension("foo.ni.dll", "{g}"), "foo.ni.{g}");
        assert_eq!(replace_extension("bare", "{g}"), "bare.{g}");
    }

    #[test]
    fn basename_handles_both_separator_kinds() {
        assert_eq!(basename("/usr/lib/x.so"), "x.so");
        assert_eq!(basename("C:\\Windows\\foo.dll"), "foo.dll");
        assert_eq!(basename("mixed/path\\leaf"), "leaf");
        assert_eq!(basename("plain"), "plain");
    }

    #[test]
    fn hex_address_prefixes() {
        assert_eq!(parse_hex_address("0x400010"), Some(0x400010));
        assert_eq!(parse_hex_address("400010"), Some(0x400010));
        assert_eq!(parse_hex_address(" ffffFFFF81000000 "), Some(0xffff_ffff_8100_0000));
        assert_eq!(parse_hex_address("not-hex"), None);
    }

    #[test]
    fn module_map_records() {
        let (_rest, (start, length, symbol)) =
            module_map_line(b"7f2c 10 some symbol with spaces").unwrap();
        assert_eq!(start, 0x7f2c);
        assert_eq!(length, 0x10);
        assert_eq!(symbol, "some symbol with spaces");
        assert!(module_map_line(b"nothex 10 x").is_err());
    }
}
