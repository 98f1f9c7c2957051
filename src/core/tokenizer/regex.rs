//! Regular-expression tokenizer.

use regex::bytes::{Captures, Regex};

use super::{IndexSink, TokenizeError};

/// Problems with a pattern or key template, reported when the tokenizer is built.
#[derive(Debug, thiserror::Error)]
pub enum PatternError
{
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("key template '{0}' references no capture group (use {{N}})")]
    Template(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part
{
    Literal(Vec<u8>),
    Group(usize),
}

/// How a key is derived from one match.
#[derive(Debug, Clone)]
enum KeySpec
{
    /// Whole match without groups, group 1 with exactly one group.
    Auto,
    /// Text interspersed with `{N}` group references.
    Template
    {
        source: String,
        parts: Vec<Part>,
    },
}

#[derive(Debug, Clone)]
pub struct RegexTokenizer
{
    re: Regex,
    key: KeySpec,
}

impl RegexTokenizer
{
    /// Index the whole match, or its single capture group.
    pub fn new(pattern: &str) -> Result<Self, PatternError>
    {
        Ok(Self {
            re: Regex::new(pattern)?,
            key: KeySpec::Auto,
        })
    }

    /// Index one specific capture group.
    pub fn with_capture(
        pattern: &str,
        group: usize,
    ) -> Result<Self, PatternError>
    {
        Self::with_template(pattern, &format!("{{{group}}}"))
    }

    /// Index a key rendered from a template such as `{2}-{1}`.
    pub fn with_template(
        pattern: &str,
        template: &str,
    ) -> Result<Self, PatternError>
    {
        let parts = parse_template(template)?;
        Ok(Self {
            re: Regex::new(pattern)?,
            key: KeySpec::Template {
                source: template.to_string(),
                parts,
            },
        })
    }

    pub fn describe(&self) -> String
    {
        match &self.key
        {
            KeySpec::Auto => self
                .re
                .as_str()
                .to_string(),
            KeySpec::Template { source, .. } => format!("{} => {}", self.re.as_str(), source),
        }
    }

    /// Add every non-overlapping match in `line` to `sink`.
    pub fn index(
        &self,
        sink: &mut dyn IndexSink,
        line: &[u8],
    ) -> Result<(), TokenizeError>
    {
        let mut at = 0usize;
        while at < line.len()
        {
            let Some(caps) = self
                .re
                .captures_at(line, at)
            else
            {
                return Ok(());
            };
            let Some(whole) = caps.get(0)
            else
            {
                return Ok(());
            };

            let (key, offset) = self.render(&caps, whole.start())?;
            sink.add(&key, offset)
                .map_err(|e| TokenizeError::Match {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    source: Box::new(e),
                })?;

            // Empty matches would otherwise never advance.
            at = if whole.end() > whole.start() { whole.end() } else { whole.end() + 1 };
        }
        Ok(())
    }

    fn render(
        &self,
        caps: &Captures<'_>,
        match_start: usize,
    ) -> Result<(Vec<u8>, usize), TokenizeError>
    {
        match &self.key
        {
            KeySpec::Auto => match self
                .re
                .captures_len()
            {
                1 => group(caps, 0).map(|m| (m.as_bytes().to_vec(), m.start())),
                2 => group(caps, 1).map(|m| (m.as_bytes().to_vec(), m.start())),
                _ => Err(TokenizeError::AmbiguousGroups),
            },
            KeySpec::Template { parts, .. } =>
            {
                // A lone reference reports the group's own position.
                if let [Part::Group(n)] = parts.as_slice()
                {
                    let m = group(caps, *n)?;
                    return Ok((m.as_bytes().to_vec(), m.start()));
                }

                let mut key = Vec::new();
                for part in parts
                {
                    match part
                    {
                        Part::Literal(text) => key.extend_from_slice(text),
                        Part::Group(n) => key.extend_from_slice(group(caps, *n)?.as_bytes()),
                    }
                }
                Ok((key, match_start))
            }
        }
    }
}

fn group<'h>(
    caps: &Captures<'h>,
    n: usize,
) -> Result<regex::bytes::Match<'h>, TokenizeError>
{
    caps.get(n)
        .ok_or(TokenizeError::MissingGroup { group: n })
}

fn parse_template(template: &str) -> Result<Vec<Part>, PatternError>
{
    let reference = Regex::new(r"\{([0-9]+)\}")?;
    let bytes = template.as_bytes();

    let mut parts = Vec::new();
    let mut last = 0usize;
    for caps in reference.captures_iter(bytes)
    {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1))
        else
        {
            continue;
        };
        if whole.start() > last
        {
            parts.push(Part::Literal(bytes[last..whole.start()].to_vec()));
        }
        let n = std::str::from_utf8(digits.as_bytes())
            .ok()
            .and_then(|d| d.parse::<usize>().ok())
            .ok_or_else(|| PatternError::Template(template.to_string()))?;
        parts.push(Part::Group(n));
        last = whole.end();
    }
    if last < bytes.len()
    {
        parts.push(Part::Literal(bytes[last..].to_vec()));
    }

    if !parts
        .iter()
        .any(|p| matches!(p, Part::Group(_)))
    {
        return Err(PatternError::Template(template.to_string()));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::tokenizer::test_support::CaptureSink;

    fn run(
        t: &RegexTokenizer,
        line: &str,
    ) -> CaptureSink
    {
        let mut sink = CaptureSink::default();
        t.index(&mut sink, line.as_bytes())
            .unwrap();
        sink
    }

    #[test]
    fn matches_multiple_on_a_line()
    {
        let words = RegexTokenizer::new(r"\w+").unwrap();
        let sink = run(&words, "these are words");
        assert_eq!(sink.captured, vec!["these", "are", "words"]);
        assert_eq!(sink.offsets, vec![0, 6, 10]);
    }

    #[test]
    fn matches_only_one_if_anchored()
    {
        let first = RegexTokenizer::new(r"^\w+").unwrap();
        assert_eq!(run(&first, "these are words").captured, vec!["these"]);
    }

    #[test]
    fn single_char_pattern()
    {
        let any = RegexTokenizer::new(".").unwrap();
        assert_eq!(
            run(&any, "0123456789").captured,
            vec!["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]
        );
    }

    #[test]
    fn single_group_is_the_key()
    {
        let t = RegexTokenizer::new("^Line ([0-9]+)").unwrap();
        let sink = run(&t, "Line 42 - Hex 2a - Mod 42");
        assert_eq!(sink.captured, vec!["42"]);
        assert_eq!(sink.offsets, vec![5]);
    }

    #[test]
    fn multiple_groups_need_a_template()
    {
        let t = RegexTokenizer::new("(a)(b)").unwrap();
        let mut sink = CaptureSink::default();
        let err = t
            .index(&mut sink, b"ab")
            .unwrap_err();
        assert!(matches!(err, TokenizeError::AmbiguousGroups));
    }

    #[test]
    fn explicit_capture_group()
    {
        let t = RegexTokenizer::with_capture(r"(\w+)=(\w+)", 2).unwrap();
        let sink = run(&t, "user=bob id=7");
        assert_eq!(sink.captured, vec!["bob", "7"]);
        assert_eq!(sink.offsets, vec![5, 12]);
    }

    #[test]
    fn template_renders_groups()
    {
        let t = RegexTokenizer::with_template(r"(\w+)@(\w+)", "{2}/{1}").unwrap();
        let sink = run(&t, "mail bob@example now");
        assert_eq!(sink.captured, vec!["example/bob"]);
        assert_eq!(sink.offsets, vec![5]);
    }

    #[test]
    fn missing_group_is_an_error()
    {
        let t = RegexTokenizer::with_template(r"(a)|(b)", "{1}").unwrap();
        let mut sink = CaptureSink::default();
        let err = t
            .index(&mut sink, b"b")
            .unwrap_err();
        assert!(matches!(err, TokenizeError::MissingGroup { group: 1 }));
    }

    #[test]
    fn template_without_groups_is_rejected()
    {
        assert!(matches!(
            RegexTokenizer::with_template("a", "plain"),
            Err(PatternError::Template(_))
        ));
    }

    #[test]
    fn empty_matches_advance()
    {
        let t = RegexTokenizer::new("x*").unwrap();
        let sink = run(&t, "ab");
        assert_eq!(sink.captured, vec!["", ""]);
    }
}
