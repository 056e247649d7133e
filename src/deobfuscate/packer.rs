//! Unpacker for Dean Edward's p.a.c.k.e.r., ported from `packer.py` (itself
//! adapted from `jsbeautifier.unpackers.packer`). Detects the
//! `eval(function(p,a,c,k,e,...)...)` wrapper and the structurally
//! identical `p,r,o,x,y,s` variant used by a couple of mirrors, which only
//! differs in its token separator.
use crate::errors::UnpackingError;
use regex::Regex;

/// Outcome of attempting to deobfuscate a script.
#[derive(Debug, PartialEq, Eq)]
pub enum UnpackResult {
    /// `source` did not start with a recognised packer signature.
    NotPacked,
    /// `source` was packed; here is the unpacked JavaScript.
    Unpacked(String),
}

/// Detects whether `source` is p.a.c.k.e.r.-obfuscated code and, if so,
/// unpacks it. Mirrors `packer.py::deobfuscate`.
pub fn deobfuscate(source: &str) -> Result<UnpackResult, UnpackingError> {
    let source = source.replace(' ', "");

    if source.starts_with("eval(function(p,r,o,x,y,s)") {
        let converted = convert_proxys(&source)?;
        return Ok(UnpackResult::Unpacked(unpack(&converted)?));
    }

    if source.starts_with("eval(function(p,a,c,k,e,") {
        return Ok(UnpackResult::Unpacked(unpack(&source)?));
    }

    Ok(UnpackResult::NotPacked)
}

/// Converts the P.R.O.X.Y.S. separator convention to the standard `|`
/// separator used by P.A.C.K.E.R., so a single `unpack` implementation
/// handles both. Mirrors `packer.py::convert_proxys`.
fn convert_proxys(source: &str) -> Result<String, UnpackingError> {
    let pieces: Vec<&str> = source.split('\'').collect();
    if pieces.len() < 4 {
        return Err(UnpackingError("unknown p.r.o.x.y.s. encoding".into()));
    }

    let n = pieces.len();
    if pieces[n - 3] != ".split(" {
        return Err(UnpackingError("unknown p.r.o.x.y.s. encoding".into()));
    }

    let separator = unescape_js(pieces[n - 2]);

    let mut pieces: Vec<String> = pieces.into_iter().map(str::to_string).collect();
    let n = pieces.len();
    pieces[n - 2] = "|".to_string();
    pieces[n - 4] = pieces[n - 4].replace(&separator, "|");

    Ok(pieces.join("'"))
}

/// Minimal JS string-escape decoding, sufficient for the single-character
/// custom separators these sites use (e.g. `\x01`, `\n`).
fn unescape_js(s: &str) -> String {
    let mut out = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Unpacks P.A.C.K.E.R.-packed JS. Mirrors `packer.py::unpack`.
fn unpack(source: &str) -> Result<String, UnpackingError> {
    let (payload, symtab, radix, count) = filter_args(source)?;

    if count != symtab.len() {
        return Err(UnpackingError("malformed p.a.c.k.e.r. symtab".into()));
    }

    let unbaser = Unbaser::new(radix)?;

    let word_re = Regex::new(r"\b\w+\b").unwrap();
    let unpacked = word_re.replace_all(&payload, |caps: &regex::Captures| {
        let word = &caps[0];
        let index = unbaser.unbase(word);
        match symtab.get(index).map(|s| s.as_str()) {
            Some(replacement) if !replacement.is_empty() => replacement.to_string(),
            _ => word.to_string(),
        }
    });

    Ok(replace_strings(&unpacked))
}

/// Extracts the four packer arguments `(payload, radix, count, symtab)`
/// via regex, mirroring `packer.py::_filterargs`'s two juicer patterns.
fn filter_args(source: &str) -> Result<(String, Vec<String>, u32, usize), UnpackingError> {
    let juicers = [
        r"\}\('(.*)', *(\d+), *(\d+), *'(.*)'\.split\('\|'\), *(\d+), *(.*)\)\)",
        r"\}\('(.*)', *(\d+), *(\d+), *'(.*)'\.split\('\|'\)",
    ];

    for pattern in juicers {
        let re = Regex::new(pattern).unwrap();
        if let Some(caps) = re.captures(source) {
            let payload = caps[1].to_string();
            let radix: u32 = caps[2]
                .parse()
                .map_err(|_| UnpackingError("corrupted p.a.c.k.e.r. data".into()))?;
            let count: usize = caps[3]
                .parse()
                .map_err(|_| UnpackingError("corrupted p.a.c.k.e.r. data".into()))?;
            let symtab: Vec<String> = caps[4].split('|').map(str::to_string).collect();
            return Ok((payload, symtab, radix, count));
        }
    }

    Err(UnpackingError(
        "could not make sense of p.a.c.k.e.r. data (unexpected code structure)".into(),
    ))
}

/// Strips a `var _NAME=["s1","s2",...];` string-table preamble and inlines
/// its `_NAME[i]` references. Mirrors `packer.py::_replacestrings`.
fn replace_strings(source: &str) -> String {
    let re = Regex::new(r#"(?s)var *(_\w+)=\["(.*?)"\];"#).unwrap();
    if let Some(caps) = re.captures(source) {
        let varname = &caps[1];
        let strings = &caps[2];
        let whole = caps.get(0).unwrap();
        let lookup: Vec<&str> = strings.split("\",\"").collect();

        let mut result = source[whole.end()..].to_string();
        for (index, value) in lookup.iter().enumerate() {
            let placeholder = format!("{varname}[{index}]");
            result = result.replace(&placeholder, &format!("\"{value}\""));
        }
        result
    } else {
        source.to_string()
    }
}

const ALPHABET_62: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHABET_95: &str =
    " !\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~";

/// Converts base-`radix` tokens to integers. Bases 2..=36 go through the
/// builtin integer parser; 37..=61 slice the base-62 alphabet; 62 and 95
/// use their fixed alphabets. Mirrors `packer.py::Unbaser`.
struct Unbaser {
    radix: u32,
    alphabet: Option<Vec<char>>,
}

impl Unbaser {
    fn new(radix: u32) -> Result<Self, UnpackingError> {
        if (2..=36).contains(&radix) {
            return Ok(Unbaser {
                radix,
                alphabet: None,
            });
        }

        let alphabet: Vec<char> = match radix {
            62 => ALPHABET_62.chars().collect(),
            95 => ALPHABET_95.chars().collect(),
            37..=61 => ALPHABET_62.chars().take(radix as usize).collect(),
            _ => return Err(UnpackingError("unsupported base encoding".into())),
        };

        Ok(Unbaser {
            radix,
            alphabet: Some(alphabet),
        })
    }

    fn unbase(&self, word: &str) -> usize {
        match &self.alphabet {
            None => usize::from_str_radix(word, self.radix).unwrap_or(0),
            Some(alphabet) => {
                let mut value: usize = 0;
                for c in word.chars() {
                    let digit = alphabet.iter().position(|&a| a == c).unwrap_or(0);
                    value = value * self.radix as usize + digit;
                }
                value
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_packed_source_is_not_packed() {
        let src = "function hello() { return 1; }";
        assert_eq!(deobfuscate(src).unwrap(), UnpackResult::NotPacked);
    }

    #[test]
    fn empty_symtab_count_zero_is_valid() {
        let src = "eval(function(p,a,c,k,e,d){return p}('hello world',10,0,''.split('|')))";
        let result = deobfuscate(src).unwrap();
        match result {
            UnpackResult::Unpacked(s) => assert_eq!(s, "hello world"),
            UnpackResult::NotPacked => panic!("expected unpacked result"),
        }
    }

    #[test]
    fn basic_symtab_substitution() {
        // payload "0 1" with symtab ["foo","bar"], radix 10 (built-in path).
        let src = "eval(function(p,a,c,k,e,d){return p}('0 1',10,2,'foo|bar'.split('|')))";
        let result = deobfuscate(src).unwrap();
        match result {
            UnpackResult::Unpacked(s) => assert_eq!(s, "foo bar"),
            UnpackResult::NotPacked => panic!("expected unpacked result"),
        }
    }

    #[test]
    fn mismatched_count_is_an_error() {
        let src = "eval(function(p,a,c,k,e,d){return p}('0 1',10,5,'foo|bar'.split('|')))";
        assert!(deobfuscate(src).is_err());
    }

    #[test]
    fn string_table_preamble_is_inlined() {
        let source = "var _x=[\"alpha\",\"beta\"];_x[0]+_x[1]";
        let result = replace_strings(source);
        assert_eq!(result, "\"alpha\"+\"beta\"");
    }

    #[test]
    fn base36_unbase() {
        let unbaser = Unbaser::new(36).unwrap();
        assert_eq!(unbaser.unbase("z"), 35);
        assert_eq!(unbaser.unbase("10"), 36);
    }

    #[test]
    fn base62_unbase() {
        let unbaser = Unbaser::new(62).unwrap();
        assert_eq!(unbaser.unbase("a"), 10);
        assert_eq!(unbaser.unbase("A"), 36);
    }
}
