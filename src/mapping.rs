//! Parsing of ProGuard and R8 mapping files.
//!
//! See the [retrace manual](https://www.guardsquare.com/en/products/proguard/manual/retrace)
//! for a description of the format.
//!
//! Parsing works line-by-line. A line that cannot be parsed produces a
//! [`ParseError`], but never stops iteration over the remaining lines.

use std::fmt;
use std::str;

use serde::Deserialize;
use thiserror::Error;

#[cfg(feature = "uuid")]
use uuid::Uuid;

/// What went wrong while parsing a line.
#[derive(Copy, Clone, Debug, PartialEq, Error)]
pub enum ParseErrorKind {
    /// The line is not valid UTF-8.
    #[error("line is not valid utf-8: {0}")]
    Utf8Error(#[from] str::Utf8Error),
    /// The line is not a header, class, field or method.
    #[error("line is not a valid proguard record")]
    InvalidRecord,
}

/// A line of a mapping file that could not be parsed.
///
/// Holds the offending line, so callers can report or skip it.
#[derive(Copy, Clone, Debug, PartialEq, Error)]
#[error("{kind}")]
pub struct ParseError<'s> {
    line: &'s [u8],
    kind: ParseErrorKind,
}

impl<'s> ParseError<'s> {
    fn invalid(line: &'s [u8]) -> Self {
        Self {
            line,
            kind: ParseErrorKind::InvalidRecord,
        }
    }

    /// The offending line that caused the error, without its line terminator.
    pub fn line(&self) -> &[u8] {
        self.line
    }

    /// What went wrong.
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }
}

/// The raw contents of a mapping file.
#[derive(Clone, Copy, Default)]
pub struct ProguardMapping<'s> {
    source: &'s [u8],
}

impl fmt::Debug for ProguardMapping<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProguardMapping")
            .field("len", &self.source.len())
            .finish()
    }
}

impl<'s> ProguardMapping<'s> {
    /// Wraps the contents of a mapping file without parsing them.
    pub fn new(source: &'s [u8]) -> Self {
        Self { source }
    }

    /// Whether the data looks like a mapping file.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_remap::ProguardMapping;
    ///
    /// let valid = ProguardMapping::new(b"a -> b:\n    void method() -> b");
    /// assert!(valid.is_valid());
    ///
    /// let invalid =
    ///     ProguardMapping::new(b"# looks: like\na -> proguard:\n  mapping but(is) -> not");
    /// assert!(!invalid.is_valid());
    /// ```
    pub fn is_valid(&self) -> bool {
        // Only the head of the file is inspected: a class followed by one of
        // its members is a good enough indicator.
        let mut has_class_line = false;
        for record in self.iter().take(50) {
            match record {
                Ok(ProguardRecord::Class { .. }) => has_class_line = true,
                Ok(ProguardRecord::Field { .. } | ProguardRecord::Method { .. })
                    if has_class_line =>
                {
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    /// Whether any method carries a line range.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_remap::ProguardMapping;
    ///
    /// let with = ProguardMapping::new(b"a -> b:\n    1:1:void method() -> a");
    /// assert!(with.has_line_info());
    ///
    /// let without = ProguardMapping::new(b"a -> b:\n    void method() -> b");
    /// assert!(!without.has_line_info());
    /// ```
    pub fn has_line_info(&self) -> bool {
        self.iter().any(|record| {
            matches!(
                record,
                Ok(ProguardRecord::Method {
                    line_mapping: Some(_),
                    ..
                })
            )
        })
    }

    /// Calculates the UUID of the mapping file.
    ///
    /// This is the debug identifier under which mapping files are stored.
    #[cfg(feature = "uuid")]
    pub fn uuid(&self) -> Uuid {
        lazy_static::lazy_static! {
            static ref NAMESPACE: Uuid = Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"guardsquare.com");
        }
        Uuid::new_v5(&NAMESPACE, self.source)
    }

    /// Iterates over the records of the mapping, one per line.
    pub fn iter(&self) -> ProguardRecordIter<'s> {
        ProguardRecordIter { slice: self.source }
    }
}

/// Iterator over the records of a [`ProguardMapping`].
#[derive(Clone, Default)]
pub struct ProguardRecordIter<'s> {
    slice: &'s [u8],
}

impl fmt::Debug for ProguardRecordIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProguardRecordIter").finish()
    }
}

impl<'s> Iterator for ProguardRecordIter<'s> {
    type Item = Result<ProguardRecord<'s>, ParseError<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.slice.iter().position(|c| !is_newline(c))?;
        let rest = &self.slice[start..];

        let (line, rest) = match rest.iter().position(is_newline) {
            Some(pos) => rest.split_at(pos),
            None => (rest, &[] as &[u8]),
        };
        self.slice = rest;

        Some(parse_line(line))
    }
}

/// The line range of a method, and the original lines it came from.
///
/// Lines are 1-based, ranges are inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineMapping {
    /// Start Line, 1-based.
    pub startline: usize,
    /// End Line, inclusive.
    pub endline: usize,
    /// The first original line.
    pub original_startline: Option<usize>,
    /// The last original line, if the original is a range.
    pub original_endline: Option<usize>,
}

/// One parsed line of a mapping file.
#[derive(Clone, Debug, PartialEq)]
pub enum ProguardRecord<'s> {
    /// A Proguard Header.
    ///
    /// R8 JSON headers (`# {"id":"sourceFile","fileName":"Foo.kt"}`) are
    /// reported with their `id` as key and their `fileName`, if any, as value.
    Header {
        /// The Key of the Header.
        key: &'s str,
        /// Optional value if the Header is a KV pair.
        value: Option<&'s str>,
    },
    /// A Class Mapping.
    Class {
        /// Original name of the class.
        original: &'s str,
        /// Obfuscated name of the class.
        obfuscated: &'s str,
    },
    /// A Field Mapping.
    Field {
        /// Type of the field
        ty: &'s str,
        /// Original name of the field.
        original: &'s str,
        /// Obfuscated name of the field.
        obfuscated: &'s str,
    },
    /// A Method Mapping.
    Method {
        /// Return Type of the method.
        ty: &'s str,
        /// Original name of the method.
        original: &'s str,
        /// Obfuscated name of the method.
        obfuscated: &'s str,
        /// Arguments of the method as raw string.
        arguments: &'s str,
        /// Original class of a foreign inlined method.
        original_class: Option<&'s str>,
        /// Optional line mapping of the method.
        line_mapping: Option<LineMapping>,
    },
}

impl<'s> ProguardRecord<'s> {
    /// Parses a single line, which must not contain a line break.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_remap::{LineMapping, ProguardRecord};
    ///
    /// let parsed = ProguardRecord::try_parse(b"# compiler: R8");
    /// assert_eq!(
    ///     parsed,
    ///     Ok(ProguardRecord::Header {
    ///         key: "compiler",
    ///         value: Some("R8")
    ///     })
    /// );
    ///
    /// let parsed = ProguardRecord::try_parse(
    ///     b"    1016:1016:void com.example1.domain.MyBean.doWork():16:16 -> buttonClicked",
    /// );
    /// assert_eq!(
    ///     parsed,
    ///     Ok(ProguardRecord::Method {
    ///         ty: "void",
    ///         original: "doWork",
    ///         obfuscated: "buttonClicked",
    ///         arguments: "",
    ///         original_class: Some("com.example1.domain.MyBean"),
    ///         line_mapping: Some(LineMapping {
    ///             startline: 1016,
    ///             endline: 1016,
    ///             original_startline: Some(16),
    ///             original_endline: Some(16),
    ///         }),
    ///     })
    /// );
    /// ```
    pub fn try_parse(line: &'s [u8]) -> Result<Self, ParseError<'s>> {
        let mut records = ProguardMapping::new(line).iter();
        let record = records.next().ok_or(ParseError::invalid(line))?;
        match records.next() {
            // a single record has to consume all of the input
            Some(_) => Err(ParseError::invalid(line)),
            None => record,
        }
    }
}

#[derive(Deserialize)]
struct R8Header<'s> {
    id: &'s str,
    #[serde(borrow, rename = "fileName", default)]
    file_name: Option<&'s str>,
}

fn parse_line(bytes: &[u8]) -> Result<ProguardRecord<'_>, ParseError<'_>> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let line = str::from_utf8(bytes).map_err(|err| ParseError {
        line: bytes,
        kind: err.into(),
    })?;

    let record = if let Some(header) = line.strip_prefix('#') {
        parse_header(header.trim())
    } else if let Some(member) = line.strip_prefix("    ") {
        parse_member(member)
    } else {
        parse_class(line)
    };

    record.ok_or(ParseError::invalid(bytes))
}

/// `# key: value`, `# key` or `# {"id":"...", ...}`
fn parse_header(header: &str) -> Option<ProguardRecord<'_>> {
    if header.starts_with('{') {
        let r8: R8Header = serde_json::from_str(header).ok()?;
        return Some(ProguardRecord::Header {
            key: r8.id,
            value: r8.file_name,
        });
    }

    let (key, value) = match header.split_once(':') {
        Some((key, value)) => (key.trim(), Some(value.trim())),
        None => (header, None),
    };

    Some(ProguardRecord::Header { key, value })
}

/// `originalclassname -> obfuscatedclassname:`
fn parse_class(line: &str) -> Option<ProguardRecord<'_>> {
    let (original, obfuscated) = line.split_once(" -> ")?;
    let obfuscated = obfuscated.strip_suffix(':')?;

    if !is_identifier(original) || !is_identifier(obfuscated) {
        return None;
    }

    Some(ProguardRecord::Class {
        original,
        obfuscated,
    })
}

/// Field or method line, without the four leading spaces:
///
/// `originalfieldtype originalfieldname -> obfuscatedfieldname`
/// `[startline:endline:]originalreturntype [originalclassname.]originalmethodname(originalargumenttype,...)[:originalstartline[:originalendline]] -> obfuscatedmethodname`
fn parse_member(line: &str) -> Option<ProguardRecord<'_>> {
    let (original, obfuscated) = line.split_once(" -> ")?;
    if !is_identifier(obfuscated) {
        return None;
    }

    let (lines, original) = match original.as_bytes().first() {
        Some(c) if c.is_ascii_digit() => {
            let (startline, rest) = original.split_once(':')?;
            let (endline, rest) = rest.split_once(':')?;
            (Some((startline.parse().ok()?, endline.parse().ok()?)), rest)
        }
        _ => (None, original),
    };

    let (ty, signature) = original.split_once(' ')?;
    if !is_identifier(ty) {
        return None;
    }

    let Some((name, rest)) = signature.split_once('(') else {
        if lines.is_some() || !is_identifier(signature) {
            return None;
        }
        return Some(ProguardRecord::Field {
            ty,
            original: signature,
            obfuscated,
        });
    };

    let (arguments, original_lines) = rest.split_once(')')?;
    let (original_startline, original_endline) = match original_lines {
        "" => (None, None),
        lines => {
            let mut parts = lines.strip_prefix(':')?.splitn(2, ':');
            let start = parts.next()?.parse().ok()?;
            let end = parts.next().map(str::parse).transpose().ok()?;
            (Some(start), end)
        }
    };

    if !is_identifier(name) {
        return None;
    }
    let (original_class, original) = match name.rsplit_once('.') {
        Some((class, method)) => (Some(class), method),
        None => (None, name),
    };

    let line_mapping = match lines {
        Some((startline, endline)) if startline > 0 && endline > 0 => Some(LineMapping {
            startline,
            endline,
            original_startline,
            original_endline,
        }),
        _ => None,
    };

    Some(ProguardRecord::Method {
        ty,
        original,
        obfuscated,
        arguments,
        original_class,
        line_mapping,
    })
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && !s.contains(char::is_whitespace)
}

fn is_newline(byte: &u8) -> bool {
    *byte == b'\r' || *byte == b'\n'
}
