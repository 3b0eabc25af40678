//! Single-pass HTML escaping for reply text.
//!
//! Entity references that are already present and the `<br>` line-break token
//! are kept as they are, so escaping an escaped string is a no-op.

const MAX_ENTITY_NAME: usize = 32;

/// Escapes `&`, `<` and `>` without touching existing entity references.
/// `<br>` variants are normalised to `\n`.
pub fn escape_text(input: &str) -> String {
    let input = normalize_breaks(input);
    let mut out = String::with_capacity(input.len());
    let mut rest = input.as_str();

    while let Some(ch) = rest.chars().next() {
        match ch {
            '&' => match entity_len(rest) {
                Some(len) => {
                    out.push_str(&rest[..len]);
                    rest = &rest[len..];
                    continue;
                }
                None => out.push_str("&amp;"),
            },
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
        rest = &rest[ch.len_utf8()..];
    }

    out
}

/// Escapes and turns newlines into `<br>`.
pub fn text_to_html(input: &str) -> String {
    escape_text(input).replace('\n', "<br>")
}

/// Plain-text view of escaped reply markup, for non-HTML renderers.
pub fn html_to_text(html: &str) -> String {
    let text = normalize_breaks(html);
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();

    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        match entity_len(rest).and_then(|len| decode_entity(&rest[1..len - 1]).map(|ch| (len, ch))) {
            Some((len, ch)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(body: &str) -> Option<char> {
    match body {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = match body.strip_prefix('#')? {
                hex if hex.starts_with(['x', 'X']) => u32::from_str_radix(&hex[1..], 16).ok()?,
                dec => dec.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Length of the entity reference at the start of `s` (which begins with `&`).
fn entity_len(s: &str) -> Option<usize> {
    let body = &s.as_bytes()[1..];
    let (digits, offset): (fn(&u8) -> bool, usize) = match body {
        [b'#', b'x' | b'X', ..] => (u8::is_ascii_hexdigit, 2),
        [b'#', ..] => (u8::is_ascii_digit, 1),
        [first, ..] if first.is_ascii_alphabetic() => (u8::is_ascii_alphanumeric, 0),
        _ => return None,
    };

    let run = body[offset..]
        .iter()
        .take(MAX_ENTITY_NAME + 1)
        .take_while(|b| digits(*b))
        .count();
    if run == 0 || run > MAX_ENTITY_NAME {
        return None;
    }
    match body.get(offset + run) {
        Some(b';') => Some(1 + offset + run + 1),
        _ => None,
    }
}

fn normalize_breaks(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find('<') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        match break_tag_len(rest) {
            Some(len) => {
                out.push('\n');
                rest = &rest[len..];
            }
            None => {
                out.push('<');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Matches `<br>`, `<br/>` and `<br />` case-insensitively.
fn break_tag_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.len() < 4 || !bytes[1..3].eq_ignore_ascii_case(b"br") {
        return None;
    }
    let mut idx = 3;
    while bytes.get(idx).is_some_and(|b| *b == b' ') {
        idx += 1;
    }
    if bytes.get(idx) == Some(&b'/') {
        idx += 1;
    }
    (bytes.get(idx) == Some(&b'>')).then_some(idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_text("<script>alert('x')</script> & co"),
            "&lt;script&gt;alert('x')&lt;/script&gt; &amp; co"
        );
    }

    #[test]
    fn keeps_existing_entities() {
        assert_eq!(escape_text("&amp; &lt; &#39; &#x27; &nbsp;"), "&amp; &lt; &#39; &#x27; &nbsp;");
        assert_eq!(escape_text("AT&T; & &#; &x"), "AT&T; &amp; &amp;#; &amp;x");
    }

    #[test]
    fn break_tags_round_trip_through_newlines() {
        assert_eq!(text_to_html("a\nb"), "a<br>b");
        assert_eq!(text_to_html("a<br>b<BR/>c<br />d"), "a<br>b<br>c<br>d");
        assert_eq!(text_to_html("<brx>"), "&lt;brx&gt;");
    }

    #[test]
    fn html_to_text_reverses_escaping() {
        let raw = "Fare < 500 & tax\n'quoted' &unknown; &#x1F686;";
        assert_eq!(html_to_text(&text_to_html(raw)), "Fare < 500 & tax\n'quoted' &unknown; \u{1F686}");
        assert_eq!(html_to_text("a<br>b &#39;c&#39;"), "a\nb 'c'");
    }
}
