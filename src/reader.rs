//! Loading of tokenizer output: an XML document with a `tokens` root whose
//! children are the five token elements. Text content is the lexeme padded
//! with exactly one character on each side; the padding is stripped here.

use std::fs;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::diagnostic::Reporter;
use crate::span::Span;
use crate::token::{Token, TokenTag};

/// Read a token file from disk. Input-format problems are recorded on the
/// reporter; the returned stream holds whatever tokens were salvageable. The
/// source text is returned alongside for diagnostic rendering.
pub fn load(path: &Path, reporter: &mut Reporter) -> (String, Vec<Token>) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            reporter.error(
                0,
                Span::dummy(),
                format!("cannot read '{}': {}", path.display(), err),
            );
            return (String::new(), Vec::new());
        }
    };
    let tokens = parse(&source, reporter);
    (source, tokens)
}

/// Parse the token XML. Unknown child elements are reported and skipped
/// without consuming a stream index; a wrong root or malformed XML aborts
/// with whatever was read so far.
pub fn parse(source: &str, reporter: &mut Reporter) -> Vec<Token> {
    let mut reader = Reader::from_str(source);
    let mut tokens = Vec::new();
    let mut root_seen = false;
    let mut root_closed = false;
    let mut child_count = 0usize;
    let mut index = 0usize;
    // Element currently open: (name, byte offset where its text begins, text).
    let mut open: Option<(String, u32, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let after = reader.buffer_position() as u32;
                if !root_seen {
                    root_seen = true;
                    if name != "tokens" {
                        let start = after.saturating_sub(name.len() as u32 + 2);
                        reporter.error(
                            0,
                            Span::new(start, after),
                            format!("root element is '{}', expected 'tokens'", name),
                        );
                        return tokens;
                    }
                    continue;
                }
                if let Some((nested, start, _)) = open.replace((name, after, String::new())) {
                    reporter.error(
                        index,
                        Span::new(start, after),
                        format!("unexpected element inside <{}>", nested),
                    );
                }
                child_count += 1;
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let after = reader.buffer_position() as u32;
                let start = after.saturating_sub(name.len() as u32 + 3);
                if !root_seen {
                    root_seen = true;
                    root_closed = true;
                    if name != "tokens" {
                        reporter.error(
                            0,
                            Span::new(start, after),
                            format!("root element is '{}', expected 'tokens'", name),
                        );
                        return tokens;
                    }
                    break;
                }
                child_count += 1;
                if push_token(&name, "", index, Span::new(start, after), &mut tokens, reporter) {
                    index += 1;
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, _, text)) = open.as_mut() {
                    match e.unescape() {
                        Ok(unescaped) => text.push_str(&unescaped),
                        Err(err) => {
                            reporter.error(index, Span::dummy(), format!("malformed XML: {}", err));
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name_len = e.name().as_ref().len() as u32;
                let after = reader.buffer_position() as u32;
                match open.take() {
                    Some((name, start, text)) => {
                        let end = after.saturating_sub(name_len + 3);
                        let span = Span::new(start, end.max(start));
                        if push_token(&name, &text, index, span, &mut tokens, reporter) {
                            index += 1;
                        }
                    }
                    None => {
                        root_closed = true;
                        break;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declaration, comments, processing instructions
            Err(err) => {
                let at = (reader.buffer_position() as u32).min(source.len() as u32);
                reporter.error(index, Span::new(at, at), format!("malformed XML: {}", err));
                return tokens;
            }
        }
    }

    if !root_seen {
        reporter.error(0, Span::dummy(), "no XML content found");
    } else if !root_closed {
        let name = open.map(|(name, _, _)| name).unwrap_or_else(|| "tokens".to_string());
        reporter.error(
            index,
            Span::dummy(),
            format!("malformed XML: unclosed element <{}>", name),
        );
    } else if child_count == 0 {
        reporter.error(0, Span::dummy(), "empty token file, no tokens found");
    }
    tokens
}

fn push_token(
    element: &str,
    text: &str,
    index: usize,
    span: Span,
    tokens: &mut Vec<Token>,
    reporter: &mut Reporter,
) -> bool {
    match TokenTag::from_element(element) {
        Some(tag) => {
            tokens.push(Token {
                tag,
                value: strip_padding(text),
                index,
                span,
            });
            true
        }
        None => {
            reporter.error(index, span, format!("unknown token element <{}>", element));
            false
        }
    }
}

/// Drop the single leading and trailing padding character the tokenizer
/// wraps every lexeme in. Content shorter than two characters becomes empty.
fn strip_padding(text: &str) -> String {
    let mut chars = text.chars();
    chars.next();
    chars.next_back();
    chars.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenTag;

    fn parse_ok(source: &str) -> (Vec<Token>, Reporter) {
        let mut reporter = Reporter::new();
        let tokens = parse(source, &mut reporter);
        (tokens, reporter)
    }

    #[test]
    fn test_simple_stream() {
        let (tokens, reporter) = parse_ok(
            "<tokens>\n<keyword> class </keyword>\n<identifier> Foo </identifier>\n\
             <symbol> { </symbol>\n<symbol> } </symbol>\n</tokens>\n",
        );
        assert_eq!(reporter.error_count(), 0);
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].tag, TokenTag::Keyword);
        assert_eq!(tokens[0].value, "class");
        assert_eq!(tokens[1].tag, TokenTag::Identifier);
        assert_eq!(tokens[1].value, "Foo");
        assert_eq!(tokens[2].value, "{");
        assert_eq!(tokens[3].value, "}");
        // Indices follow source order.
        assert_eq!(
            tokens.iter().map(|t| t.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_token_spans_point_at_padded_lexeme() {
        let source = "<tokens><keyword> class </keyword></tokens>";
        let (tokens, _) = parse_ok(source);
        let span = tokens[0].span;
        assert_eq!(&source[span.start as usize..span.end as usize], " class ");
    }

    #[test]
    fn test_entities_are_decoded() {
        let (tokens, reporter) = parse_ok(
            "<tokens><symbol> &lt; </symbol><symbol> &gt; </symbol><symbol> &amp; </symbol></tokens>",
        );
        assert_eq!(reporter.error_count(), 0);
        let values: Vec<&str> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, ["<", ">", "&"]);
    }

    #[test]
    fn test_string_constant_keeps_inner_spaces() {
        let (tokens, _) =
            parse_ok("<tokens><stringConstant> Hi there </stringConstant></tokens>");
        assert_eq!(tokens[0].tag, TokenTag::StrConst);
        assert_eq!(tokens[0].value, "Hi there");
    }

    #[test]
    fn test_short_content_becomes_empty() {
        let (tokens, _) = parse_ok("<tokens><symbol></symbol><symbol>x</symbol></tokens>");
        assert_eq!(tokens[0].value, "");
        assert_eq!(tokens[1].value, "");
    }

    #[test]
    fn test_unknown_element_is_skipped_without_an_index() {
        let (tokens, reporter) = parse_ok(
            "<tokens><keyword> class </keyword><comment> hm </comment>\
             <identifier> Foo </identifier></tokens>",
        );
        assert_eq!(reporter.error_count(), 1);
        assert_eq!(tokens.len(), 2);
        // The skipped element does not consume a stream index.
        assert_eq!(tokens[1].index, 1);
    }

    #[test]
    fn test_wrong_root_yields_no_tokens() {
        let (tokens, reporter) = parse_ok("<notTokens><keyword> class </keyword></notTokens>");
        assert_eq!(tokens.len(), 0);
        assert_eq!(reporter.error_count(), 1);
        assert!(reporter.diagnostics()[0].message.contains("'tokens'"));
    }

    #[test]
    fn test_empty_root_is_reported() {
        let (tokens, reporter) = parse_ok("<tokens>\n</tokens>");
        assert!(tokens.is_empty());
        assert_eq!(reporter.error_count(), 1);
        assert!(reporter.diagnostics()[0].message.contains("empty"));
    }

    #[test]
    fn test_self_closing_empty_root_is_reported() {
        let (tokens, reporter) = parse_ok("<tokens/>");
        assert!(tokens.is_empty());
        assert_eq!(reporter.error_count(), 1);
        assert!(reporter.diagnostics()[0].message.contains("empty"));
    }

    #[test]
    fn test_unclosed_element_is_reported() {
        let mut reporter = Reporter::new();
        parse("<tokens><keyword> class ", &mut reporter);
        assert!(reporter.has_errors());
    }

    #[test]
    fn test_completely_empty_input() {
        let (tokens, reporter) = parse_ok("");
        assert!(tokens.is_empty());
        assert!(reporter.has_errors());
    }

    #[test]
    fn test_load_missing_file() {
        let mut reporter = Reporter::new();
        let (source, tokens) = load(Path::new("/nonexistent/Foo_myT.xml"), &mut reporter);
        assert!(source.is_empty());
        assert!(tokens.is_empty());
        assert_eq!(reporter.error_count(), 1);
    }
}
