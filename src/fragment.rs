use once_cell::sync::Lazy;
use ratatui::layout::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use regex::Regex;

/// Renders the trusted HTML fragments the portal serves (post bodies and
/// short descriptions) into terminal text. Block tags become lines, list
/// items become bullets, headings keep their level; inline markup and
/// unknown tags are stripped.
#[derive(Default)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, input: &str) -> Text<'static> {
        let mut writer = FragmentWriter::default();
        for token in tokenize(input) {
            match token {
                Token::Text(text) => writer.text(&text),
                Token::Open(tag) => writer.open_tag(&tag),
                Token::Close(tag) => writer.close_tag(&tag),
            }
        }
        writer.into_text()
    }
}

/// One-line plain-text preview: tags stripped, entities decoded, whitespace
/// collapsed.
pub fn plain_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for token in tokenize(input) {
        match token {
            Token::Text(text) => out.push_str(&text),
            Token::Open(tag) | Token::Close(tag) => {
                if is_block_tag(&tag) {
                    out.push(' ');
                }
            }
        }
    }
    collapse_whitespace(&out)
}

enum Token {
    Text(String),
    Open(String),
    Close(String),
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = input;
    while let Some(start) = rest.find('<') {
        if start > 0 {
            tokens.push(Token::Text(decode_entities(&rest[..start])));
        }
        let Some(end) = rest[start..].find('>') else {
            // Unterminated tag: treat the remainder as text.
            tokens.push(Token::Text(decode_entities(&rest[start..])));
            return tokens;
        };
        let raw = &rest[start + 1..start + end];
        let closing = raw.starts_with('/');
        let name: String = raw
            .trim_start_matches('/')
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if !name.is_empty() {
            if closing {
                tokens.push(Token::Close(name));
            } else {
                tokens.push(Token::Open(name));
            }
        }
        rest = &rest[start + end + 1..];
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(decode_entities(rest)));
    }
    tokens
}

fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div" | "br" | "li" | "ul" | "ol" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "tr"
    )
}

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#x?[0-9a-fA-F]+|[a-zA-Z]+);").expect("entity regex"));

fn decode_entities(input: &str) -> String {
    ENTITY
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            match body {
                "amp" => "&".to_string(),
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "quot" => "\"".to_string(),
                "apos" => "'".to_string(),
                "nbsp" => " ".to_string(),
                _ => {
                    if let Some(number) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X"))
                    {
                        decode_codepoint(u32::from_str_radix(number, 16).ok(), &caps[0])
                    } else if let Some(number) = body.strip_prefix('#') {
                        decode_codepoint(number.parse::<u32>().ok(), &caps[0])
                    } else {
                        caps[0].to_string()
                    }
                }
            }
        })
        .into_owned()
}

fn decode_codepoint(value: Option<u32>, original: &str) -> String {
    value
        .and_then(char::from_u32)
        .map(String::from)
        .unwrap_or_else(|| original.to_string())
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Default)]
struct FragmentWriter {
    lines: Vec<RenderLine>,
    buffer: String,
    heading_level: Option<u8>,
    list_depth: usize,
    in_item: bool,
}

#[derive(Clone)]
enum RenderLine {
    Text(String),
    Heading { level: u8, text: String },
    Bullet { indent: usize, text: String },
    Separator,
}

impl FragmentWriter {
    fn text(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn open_tag(&mut self, tag: &str) {
        match tag {
            "p" | "div" => self.flush_buffer(),
            "br" => {
                let keep_heading = self.heading_level;
                self.flush_buffer();
                self.heading_level = keep_heading;
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush_buffer();
                self.heading_level = tag[1..].parse().ok();
            }
            "ul" | "ol" => {
                self.flush_buffer();
                self.list_depth += 1;
            }
            "li" => {
                self.flush_buffer();
                self.in_item = true;
            }
            "img" => self.buffer.push_str("[चित्र]"),
            _ => {}
        }
    }

    fn close_tag(&mut self, tag: &str) {
        match tag {
            "p" | "div" => {
                self.flush_buffer();
                self.lines.push(RenderLine::Separator);
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush_buffer();
                self.heading_level = None;
                self.lines.push(RenderLine::Separator);
            }
            "ul" | "ol" => {
                self.flush_buffer();
                self.list_depth = self.list_depth.saturating_sub(1);
                if self.list_depth == 0 {
                    self.lines.push(RenderLine::Separator);
                }
            }
            "li" => {
                self.flush_buffer();
                self.in_item = false;
            }
            _ => {}
        }
    }

    fn flush_buffer(&mut self) {
        let text = collapse_whitespace(&self.buffer);
        self.buffer.clear();
        if text.is_empty() {
            return;
        }

        if let Some(level) = self.heading_level {
            self.lines.push(RenderLine::Heading { level, text });
            return;
        }

        if self.in_item {
            self.lines.push(RenderLine::Bullet {
                indent: self.list_depth.saturating_sub(1),
                text,
            });
            return;
        }

        self.lines.push(RenderLine::Text(text));
    }

    fn into_text(mut self) -> Text<'static> {
        self.flush_buffer();
        while matches!(self.lines.last(), Some(RenderLine::Separator)) {
            self.lines.pop();
        }

        let mut styled_lines = Vec::with_capacity(self.lines.len());
        for line in self.lines {
            match line {
                RenderLine::Text(content) => styled_lines.push(Line::from(Span::raw(content))),
                RenderLine::Heading { level, text } => {
                    styled_lines.push(Line::from(Span::styled(text, heading_style(level))));
                }
                RenderLine::Bullet { indent, text } => {
                    styled_lines.push(Line::from(vec![
                        Span::raw("  ".repeat(indent)),
                        Span::styled("• ", Style::default().fg(Color::Yellow)),
                        Span::raw(text),
                    ]));
                }
                RenderLine::Separator => styled_lines.push(Line::default()),
            }
        }

        if styled_lines.is_empty() {
            styled_lines.push(Line::from(Span::raw("")));
        }

        Text {
            lines: styled_lines,
            alignment: Some(Alignment::Left),
            style: Style::default(),
        }
    }
}

fn heading_style(level: u8) -> Style {
    match level {
        1 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        2 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        3 => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        _ => Style::default().fg(Color::Magenta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered_lines(input: &str) -> Vec<String> {
        Renderer::new()
            .render(input)
            .lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn paragraphs_become_separated_lines() {
        let lines = rendered_lines("<p>पहला पैरा</p><p>दूसरा पैरा</p>");
        assert_eq!(lines, ["पहला पैरा", "", "दूसरा पैरा"]);
    }

    #[test]
    fn inline_markup_is_stripped() {
        let lines = rendered_lines("<p>यह <b>मोटा</b> और <em>तिरछा</em> है</p>");
        assert_eq!(lines, ["यह मोटा और तिरछा है"]);
    }

    #[test]
    fn line_breaks_split_within_a_paragraph() {
        let lines = rendered_lines("<p>ऊपर<br>नीचे</p>");
        assert_eq!(lines, ["ऊपर", "नीचे"]);
    }

    #[test]
    fn list_items_become_bullets() {
        let lines = rendered_lines("<ul><li>एक</li><li>दो</li></ul>");
        assert_eq!(lines, ["• एक", "• दो"]);
    }

    #[test]
    fn headings_survive_with_text() {
        let lines = rendered_lines("<h2>शीर्षक</h2><p>मुख्य भाग</p>");
        assert_eq!(lines, ["शीर्षक", "", "मुख्य भाग"]);
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(
            plain_text("काला&nbsp;नमक &amp; मसाला &#2361;&#2367;&#2344;&#2381;&#2342;&#2368;"),
            "काला नमक & मसाला हिन्दी"
        );
    }

    #[test]
    fn unterminated_tag_is_kept_as_text() {
        assert_eq!(plain_text("टूटा <b हिस्सा"), "टूटा <b हिस्सा");
    }

    #[test]
    fn plain_text_collapses_whitespace() {
        assert_eq!(
            plain_text("<div>  एक \n  <span>साथ</span> </div>"),
            "एक साथ"
        );
    }
}
