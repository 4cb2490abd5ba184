use std::collections::HashMap;

use crate::mapping::{ProguardMapping, ProguardRecord};
use crate::view::MappedFrame;

#[derive(Clone, Debug, PartialEq, Eq)]
struct MemberMapping<'s> {
    startline: usize,
    endline: usize,
    original_class: Option<&'s str>,
    original: &'s str,
    original_startline: usize,
    original_endline: Option<usize>,
}

impl MemberMapping<'_> {
    fn matches_line(&self, line: usize) -> bool {
        // members without a line range match every line
        self.endline == 0 || (self.startline..=self.endline).contains(&line)
    }

    fn original_line(&self, line: usize) -> usize {
        // parents of inlined frames don't have an `original_endline`, and the
        // innermost inlined frame needs to be offset into its range.
        match self.original_endline {
            Some(endline) if endline != self.original_startline => {
                self.original_startline + line.saturating_sub(self.startline)
            }
            _ => self.original_startline,
        }
    }
}

#[derive(Clone, Debug)]
struct ClassMapping<'s> {
    original: &'s str,
    members: HashMap<&'s str, Vec<MemberMapping<'s>>>,
}

/// An index over a parsed [`ProguardMapping`].
///
/// This can remap class names and expand single obfuscated stack frames into
/// the (possibly inlined) original frames.
#[derive(Clone, Debug, Default)]
pub struct ProguardMapper<'s> {
    classes: HashMap<&'s str, ClassMapping<'s>>,
    has_line_info: bool,
}

impl<'s> From<&'s str> for ProguardMapper<'s> {
    fn from(s: &'s str) -> Self {
        Self::new(ProguardMapping::new(s.as_bytes()))
    }
}

impl<'s> ProguardMapper<'s> {
    /// Create a new ProguardMapper.
    ///
    /// Lines that fail to parse are skipped.
    pub fn new(mapping: ProguardMapping<'s>) -> Self {
        let mut classes = HashMap::new();
        let mut current: Option<(&'s str, ClassMapping<'s>)> = None;
        let mut has_line_info = false;

        for record in mapping.iter().filter_map(Result::ok) {
            match record {
                ProguardRecord::Class {
                    original,
                    obfuscated,
                } => {
                    if let Some((obfuscated, class)) = current.take() {
                        classes.insert(obfuscated, class);
                    }
                    let class = ClassMapping {
                        original,
                        members: HashMap::new(),
                    };
                    current = Some((obfuscated, class));
                }
                ProguardRecord::Method {
                    original,
                    obfuscated,
                    original_class,
                    line_mapping,
                    ..
                } => {
                    // methods before the first class line have no owner
                    let Some((_, class)) = current.as_mut() else {
                        continue;
                    };

                    has_line_info |= line_mapping.is_some();

                    // in case the mapping has no line records, we use `0` here.
                    let member = match line_mapping {
                        Some(mapping) => MemberMapping {
                            startline: mapping.startline,
                            endline: mapping.endline,
                            original_class,
                            original,
                            original_startline: mapping
                                .original_startline
                                .unwrap_or(mapping.startline),
                            original_endline: match mapping.original_startline {
                                Some(_) => mapping.original_endline,
                                None => Some(mapping.endline),
                            },
                        },
                        None => MemberMapping {
                            startline: 0,
                            endline: 0,
                            original_class,
                            original,
                            original_startline: 0,
                            original_endline: None,
                        },
                    };

                    class.members.entry(obfuscated).or_default().push(member);
                }
                _ => {}
            }
        }

        if let Some((obfuscated, class)) = current {
            classes.insert(obfuscated, class);
        }

        Self {
            classes,
            has_line_info,
        }
    }

    /// Whether any method in the mapping carries a line range.
    pub fn has_line_info(&self) -> bool {
        self.has_line_info
    }

    /// Remaps an obfuscated Class.
    ///
    /// This works on the fully-qualified name of the class, with its complete
    /// module prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// let mapping = r#"android.arch.core.executor.ArchTaskExecutor -> a.a.a.a.c:"#;
    /// let mapper = proguard_remap::ProguardMapper::from(mapping);
    ///
    /// let mapped = mapper.remap_class("a.a.a.a.c");
    /// assert_eq!(mapped, Some("android.arch.core.executor.ArchTaskExecutor"));
    /// ```
    pub fn remap_class(&self, class: &str) -> Option<&'s str> {
        self.classes.get(class).map(|class| class.original)
    }

    /// Remaps a single obfuscated stack frame.
    ///
    /// Returns zero or more [`MappedFrame`]s. More than one frame is returned
    /// when the obfuscated method had other methods inlined into it. The
    /// frames are listed as the mapping file lists them: the innermost
    /// inlined call first, the obfuscated method's own record last.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_remap::{MappedFrame, ProguardMapper};
    ///
    /// let mapper = ProguardMapper::from(
    ///     "com.example.Main -> a:
    ///     7:8:void helper(long):78:79 -> b
    ///     7:8:void main(java.lang.String[]):101 -> b",
    /// );
    ///
    /// assert_eq!(
    ///     mapper.remap_frame("a", "b", 8),
    ///     vec![
    ///         MappedFrame::new("com.example.Main", "helper", 79),
    ///         MappedFrame::new("com.example.Main", "main", 101),
    ///     ],
    /// );
    /// ```
    pub fn remap_frame(&self, class: &str, method: &str, line: usize) -> Vec<MappedFrame<'s>> {
        let Some(class) = self.classes.get(class) else {
            return Vec::new();
        };
        let Some(members) = class.members.get(method) else {
            return Vec::new();
        };

        members
            .iter()
            .filter(|member| member.matches_line(line))
            .map(|member| MappedFrame {
                class_name: member.original_class.unwrap_or(class.original),
                method: member.original,
                line: member.original_line(line),
            })
            .collect()
    }
}
