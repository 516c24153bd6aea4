//! Wikitext template parsing and markup stripping.
//!
//! A recursive-descent walk over the raw page text collects every template
//! invocation (nested ones included) in document order. The stripper removes
//! wiki decoration from field values while expanding the small fixed set of
//! inline templates the card tables use; everything else expands to nothing.
//! HTML comments are copied through verbatim because the printing-list
//! parser treats commented lines as a missing-release sentinel.

/// One `name=value` (or positional) template argument. Positional arguments
/// get MediaWiki's implicit numeric names ("1", "2", ...). Values stay raw;
/// trimming and stripping happen at extraction time.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl Template {
    /// Look up an argument by trimmed name.
    pub fn arg(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name.trim() == name)
    }

    /// Value of the nth positional argument (1-based, MediaWiki convention).
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.arg(&index.to_string()).map(|a| a.value.as_str())
    }
}

/// All templates of a page in document order, parents before children.
#[derive(Debug, Default)]
pub struct ParsedMarkup {
    pub templates: Vec<Template>,
}

pub fn parse(wikitext: &str) -> ParsedMarkup {
    let mut parsed = ParsedMarkup::default();
    collect_templates(wikitext, &mut parsed.templates);
    parsed
}

fn collect_templates(text: &str, out: &mut Vec<Template>) {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if starts_with(&chars, i, "{{") {
            if let Some((template, end)) = parse_template_at(&chars, i) {
                let values: Vec<String> =
                    template.arguments.iter().map(|a| a.value.clone()).collect();
                out.push(template);
                for value in values {
                    collect_templates(&value, out);
                }
                i = end;
                continue;
            }
        }
        i += 1;
    }
}

fn starts_with(chars: &[char], at: usize, pattern: &str) -> bool {
    pattern
        .chars()
        .enumerate()
        .all(|(offset, expected)| chars.get(at + offset) == Some(&expected))
}

/// Index just past the `}}` matching the `{{` at `start`, or None when the
/// template never closes.
fn balanced_end(chars: &[char], start: usize, open: &str, close: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        if starts_with(chars, i, open) {
            depth += 1;
            i += open.len();
        } else if starts_with(chars, i, close) {
            depth -= 1;
            i += close.len();
            if depth == 0 {
                return Some(i);
            }
        } else {
            i += 1;
        }
    }
    None
}

struct PartBuilder {
    text: String,
    // Byte offset of the first top-level `=`, splitting name from value.
    equals: Option<usize>,
}

impl PartBuilder {
    fn new() -> Self {
        PartBuilder {
            text: String::new(),
            equals: None,
        }
    }
}

/// Parse the template starting at `start` (which must point at `{{`).
/// Returns the template and the index just past its closing braces.
fn parse_template_at(chars: &[char], start: usize) -> Option<(Template, usize)> {
    let end = balanced_end(chars, start, "{{", "}}")?;
    let mut parts = vec![PartBuilder::new()];
    let mut i = start + 2;
    let body_end = end - 2;
    while i < body_end {
        if starts_with(chars, i, "{{") {
            // Nested template: copied verbatim into the current part so its
            // own pipes and equals signs never split the outer arguments.
            let nested_end = balanced_end(chars, i, "{{", "}}").unwrap_or(body_end);
            let nested_end = nested_end.min(body_end);
            let part = parts.last_mut().unwrap();
            part.text.extend(&chars[i..nested_end]);
            i = nested_end;
        } else if starts_with(chars, i, "[[") {
            let link_end = balanced_end(chars, i, "[[", "]]").unwrap_or(body_end);
            let link_end = link_end.min(body_end);
            let part = parts.last_mut().unwrap();
            part.text.extend(&chars[i..link_end]);
            i = link_end;
        } else if chars[i] == '|' {
            parts.push(PartBuilder::new());
            i += 1;
        } else {
            let part = parts.last_mut().unwrap();
            if chars[i] == '=' && part.equals.is_none() {
                part.equals = Some(part.text.len());
            }
            part.text.push(chars[i]);
            i += 1;
        }
    }

    let mut parts = parts.into_iter();
    let name = parts.next().map(|p| p.text).unwrap_or_default();
    let mut arguments = Vec::new();
    let mut positional = 0usize;
    for part in parts {
        match part.equals {
            Some(offset) => arguments.push(Argument {
                name: part.text[..offset].trim().to_string(),
                value: part.text[offset + 1..].to_string(),
            }),
            None => {
                positional += 1;
                arguments.push(Argument {
                    name: positional.to_string(),
                    value: part.text,
                });
            }
        }
    }
    Some((Template { name, arguments }, end))
}

/// Expansions for the fixed inline-template vocabulary found in card text.
/// Argument values are stripped and re-expanded innermost-first, since a
/// ruby base can itself contain another template. Everything unrecognized
/// expands to an empty string.
pub fn expand_card_text_templates(template: &Template) -> String {
    match template.name.trim().to_lowercase().as_str() {
        "ruby" => {
            let base = clean_value(template.positional(1).unwrap_or(""));
            let gloss = clean_value(template.positional(2).unwrap_or(""));
            format!("<ruby>{}<rt>{}</rt></ruby>", base, gloss)
        }
        "fullwidth wordwrap" => clean_value(template.positional(1).unwrap_or("")),
        _ => String::new(),
    }
}

/// Strip wiki decoration from a field value, expanding templates through
/// the card-text dispatch. The result contains no template syntax, so a
/// second pass is a no-op.
pub fn clean_value(wikitext: &str) -> String {
    strip_markup_except_templates(wikitext, &expand_card_text_templates)
        .trim()
        .to_string()
}

/// Remove links, bold/italic markers, and unexpanded templates from `text`,
/// substituting `expand(template)` for each template encountered. HTML
/// comments pass through untouched.
pub fn strip_markup_except_templates(
    text: &str,
    expand: &dyn Fn(&Template) -> String,
) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if starts_with(&chars, i, "<!--") {
            let comment_end = find_pattern(&chars, i + 4, "-->")
                .map(|p| p + 3)
                .unwrap_or(chars.len());
            out.extend(&chars[i..comment_end]);
            i = comment_end;
        } else if starts_with(&chars, i, "{{") {
            match parse_template_at(&chars, i) {
                Some((template, end)) => {
                    out.push_str(&expand(&template));
                    i = end;
                }
                None => {
                    // Unterminated braces: keep them, nothing to expand.
                    out.push_str("{{");
                    i += 2;
                }
            }
        } else if starts_with(&chars, i, "[[") {
            match balanced_end(&chars, i, "[[", "]]") {
                Some(end) => {
                    let inner: String = chars[i + 2..end - 2].iter().collect();
                    out.push_str(wikilink_text(&inner));
                    i = end;
                }
                None => {
                    out.push_str("[[");
                    i += 2;
                }
            }
        } else if starts_with(&chars, i, "'''") {
            i += 3;
        } else if starts_with(&chars, i, "''") {
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// `[[target|display]]` renders as the display text, `[[target]]` as the
/// target itself.
fn wikilink_text(inner: &str) -> &str {
    match inner.rsplit_once('|') {
        Some((_, display)) => display,
        None => inner,
    }
}

fn find_pattern(chars: &[char], from: usize, pattern: &str) -> Option<usize> {
    (from..chars.len()).find(|&i| starts_with(chars, i, pattern))
}

/// Replace out-of-band Unicode interlinear annotation characters
/// (U+FFF9..U+FFFB) with the same inline ruby markup template expansion
/// produces, so every source yields one uniform representation.
pub fn replace_interlinear_annotations(name: &str) -> String {
    name.replace('\u{fff9}', "<ruby>")
        .replace('\u{fffa}', "<rt>")
        .replace('\u{fffb}', "</rt></ruby>")
}

#[cfg(test)]
mod markup_tests {
    use super::*;

    #[test]
    fn parses_named_arguments() {
        let parsed = parse("{{CardTable2 | name = Dark Magician | atk = 2500 }}");
        assert_eq!(parsed.templates.len(), 1);
        let template = &parsed.templates[0];
        assert_eq!(template.name.trim(), "CardTable2");
        assert_eq!(template.arg("name").unwrap().value.trim(), "Dark Magician");
        assert_eq!(template.arg("atk").unwrap().value.trim(), "2500");
    }

    #[test]
    fn parses_positional_arguments() {
        let parsed = parse("{{Ruby|強欲|ごうよく}}");
        let template = &parsed.templates[0];
        assert_eq!(template.positional(1), Some("強欲"));
        assert_eq!(template.positional(2), Some("ごうよく"));
    }

    #[test]
    fn nested_templates_listed_in_document_order() {
        let parsed = parse("{{CardTable2 | ja_name = {{Ruby|壺|つぼ}}貪欲 }}");
        let names: Vec<&str> = parsed
            .templates
            .iter()
            .map(|t| t.name.trim())
            .collect();
        assert_eq!(names, vec!["CardTable2", "Ruby"]);
    }

    #[test]
    fn pipe_inside_nested_template_does_not_split_outer_argument() {
        let parsed = parse("{{Outer | field = a{{Inner|x|y}}b }}");
        let outer = &parsed.templates[0];
        assert_eq!(outer.arguments.len(), 1);
        assert_eq!(outer.arg("field").unwrap().value.trim(), "a{{Inner|x|y}}b");
    }

    #[test]
    fn equals_inside_nested_template_does_not_name_the_argument() {
        let parsed = parse("{{Outer | {{Inner|k=v}} }}");
        let outer = &parsed.templates[0];
        assert_eq!(outer.arguments[0].name, "1");
    }

    #[test]
    fn ruby_template_expands_to_inline_markup() {
        let cleaned = clean_value("{{Ruby|強欲|ごうよく}}な壺");
        assert_eq!(cleaned, "<ruby>強欲<rt>ごうよく</rt></ruby>な壺");
    }

    #[test]
    fn ruby_expansion_is_idempotent() {
        let once = clean_value("{{Ruby|強欲|ごうよく}}な壺");
        let twice = clean_value(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn wordwrap_template_unwraps_recursively() {
        let cleaned = clean_value("{{Fullwidth wordwrap|{{Ruby|壺|つぼ}}}}");
        assert_eq!(cleaned, "<ruby>壺<rt>つぼ</rt></ruby>");
    }

    #[test]
    fn unknown_templates_expand_to_nothing() {
        assert_eq!(clean_value("before {{Unknown|x}} after"), "before  after");
    }

    #[test]
    fn strips_links_and_formatting() {
        assert_eq!(
            clean_value("'''[[Monster Card|monsters]]''' and [[Spell Card]]s"),
            "monsters and Spell Cards"
        );
    }

    #[test]
    fn comments_survive_the_strip_pass() {
        let cleaned = clean_value("KR001; Set\n<!-- no French release -->");
        assert!(cleaned.contains("<!-- no French release -->"));
    }

    #[test]
    fn unterminated_template_is_left_alone() {
        assert_eq!(clean_value("broken {{Ruby|a"), "broken {{Ruby|a");
    }

    #[test]
    fn interlinear_annotations_become_ruby_markup() {
        let raw = "\u{fff9}강귀\u{fffa}강림\u{fffb}";
        assert_eq!(
            replace_interlinear_annotations(raw),
            "<ruby>강귀<rt>강림</rt></ruby>"
        );
    }
}
