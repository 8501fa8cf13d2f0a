//! Defensive scrubbing of user-authored strings before persistence.
//!
//! Every function here is a fixed point under re-application: feeding its
//! own output back in returns the output unchanged.

/// Tags allowed in message bodies, bare form only (no attributes).
const ALLOWED_TAGS: &[&str] = &["b", "i", "u", "em", "strong", "br", "p"];

/// URI schemes removed wherever they appear.
const FORBIDDEN_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:"];

/// Scrub a plain-text field: strip all tags, remove dangerous URI schemes,
/// entity-escape markup characters, trim surrounding whitespace.
pub fn sanitize_text(input: &str) -> String {
    let stripped = strip_tags(input);
    let cleaned = strip_schemes(&stripped);
    escape_markup(&cleaned, false).trim().to_string()
}

/// Scrub a message body: keep the basic formatting tags (b, i, u, em,
/// strong, br, p) in bare form, escape everything else, remove `on*=`
/// handler patterns and dangerous URI schemes.
pub fn sanitize_message_body(input: &str) -> String {
    let cleaned = strip_schemes(&strip_event_handlers(input));
    escape_markup(&cleaned, true).trim().to_string()
}

/// Scrub a room name: plain-text sanitize clamped to 100 characters.
pub fn sanitize_room_name(input: &str) -> String {
    clamp_chars(&sanitize_text(input), 100)
}

/// Remove `<...>` spans that look like tags. A `<` not opening a tag
/// (not followed by `/`, `!` or a letter, or never closed) is kept and
/// escaped later.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '<' {
            let rest = &input[i + 1..];
            let opens_tag = rest
                .chars()
                .next()
                .map(|n| n == '/' || n == '!' || n.is_ascii_alphabetic())
                .unwrap_or(false);
            if opens_tag {
                if let Some(close) = rest.find('>') {
                    let end = i + 1 + close;
                    while let Some(&(j, _)) = chars.peek() {
                        if j <= end {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Remove forbidden URI schemes until none remain (removal can splice a new
/// occurrence together, so a single pass is not enough).
fn strip_schemes(input: &str) -> String {
    let mut out = input.to_string();
    loop {
        let lower = out.to_ascii_lowercase();
        let hit = FORBIDDEN_SCHEMES
            .iter()
            .filter_map(|scheme| lower.find(scheme).map(|i| (i, scheme.len())))
            .min_by_key(|&(i, _)| i);
        match hit {
            Some((i, len)) => {
                out.replace_range(i..i + len, "");
            }
            None => break out,
        }
    }
}

/// Remove `on<letters>=` event-handler patterns (whitespace allowed before
/// the `=`), looping until none remain.
fn strip_event_handlers(input: &str) -> String {
    let mut out = input.to_string();
    while let Some((start, end)) = find_event_handler(&out) {
        out.replace_range(start..end, "");
    }
    out
}

fn find_event_handler(s: &str) -> Option<(usize, usize)> {
    let lower = s.to_ascii_lowercase();
    let lb = lower.as_bytes();
    let mut i = 0;
    while i + 2 < lb.len() {
        if lb[i] == b'o' && lb[i + 1] == b'n' {
            let mut j = i + 2;
            while j < lb.len() && lb[j].is_ascii_alphabetic() {
                j += 1;
            }
            if j > i + 2 {
                let mut k = j;
                while k < lb.len() && lb[k].is_ascii_whitespace() {
                    k += 1;
                }
                if k < lb.len() && lb[k] == b'=' {
                    return Some((i, k + 1));
                }
            }
        }
        i += 1;
    }
    None
}

/// Entity-escape markup characters. When `allow_basic_tags` is set, bare
/// allowlisted tags pass through normalized to lowercase; everything else
/// is escaped. Existing entities are recognized so escaping is idempotent.
fn escape_markup(input: &str, allow_basic_tags: bool) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    let mut iter = input.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        match c {
            '<' => {
                if allow_basic_tags {
                    if let Some((consumed, normalized)) = match_allowed_tag(&input[i..]) {
                        out.push_str(&normalized);
                        let end = i + consumed;
                        while let Some(&(j, _)) = iter.peek() {
                            if j < end {
                                iter.next();
                            } else {
                                break;
                            }
                        }
                        continue;
                    }
                }
                out.push_str("&lt;");
            }
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '&' => {
                if starts_with_entity(&input[i..]) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Match `<tag>`, `</tag>` or `<tag/>` for an allowlisted tag name.
/// Returns the consumed byte length and the lowercase-normalized form.
fn match_allowed_tag(s: &str) -> Option<(usize, String)> {
    let rest = s.strip_prefix('<')?;
    let (closing, rest) = match rest.strip_prefix('/') {
        Some(r) => (true, r),
        None => (false, rest),
    };
    let name_len = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if name_len == 0 {
        return None;
    }
    let name = rest[..name_len].to_ascii_lowercase();
    if !ALLOWED_TAGS.contains(&name.as_str()) {
        return None;
    }
    let after = &rest[name_len..];
    let (self_closing, after) = match after.strip_prefix('/') {
        Some(r) => (true, r),
        None => (false, after),
    };
    if !after.starts_with('>') || (closing && self_closing) {
        return None;
    }
    let consumed = 1 + closing as usize + name_len + self_closing as usize + 1;
    let normalized = format!(
        "<{}{}{}>",
        if closing { "/" } else { "" },
        name,
        if self_closing { "/" } else { "" },
    );
    Some((consumed, normalized))
}

/// Recognize entities this module emits (plus numeric references) so a
/// second escape pass leaves them alone.
fn starts_with_entity(s: &str) -> bool {
    for named in ["&amp;", "&lt;", "&gt;", "&quot;"] {
        if s.starts_with(named) {
            return true;
        }
    }
    let rest = match s.strip_prefix("&#") {
        Some(r) => r,
        None => return false,
    };
    let (digits, radix_ok): (&str, bool) = match rest.strip_prefix('x').or_else(|| rest.strip_prefix('X')) {
        Some(hex) => (hex, true),
        None => (rest, false),
    };
    let len = digits
        .chars()
        .take_while(|c| if radix_ok { c.is_ascii_hexdigit() } else { c.is_ascii_digit() })
        .count();
    len > 0 && digits[len..].starts_with(';')
}

/// Truncate to `max` characters without severing a trailing entity.
fn clamp_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max).collect();
    if let Some(amp) = out.rfind('&') {
        if !out[amp..].contains(';') {
            out.truncate(amp);
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_fixed_point(f: fn(&str) -> String, input: &str) {
        let once = f(input);
        let twice = f(&once);
        assert_eq!(once, twice, "not idempotent for {:?}", input);
    }

    #[test]
    fn text_strips_tags_and_escapes() {
        assert_eq!(
            sanitize_text("<script>alert('x')</script> hi"),
            "alert(&#x27;x&#x27;) hi"
        );
        assert_eq!(sanitize_text("a < b & c > d"), "a &lt; b &amp; c &gt; d");
    }

    #[test]
    fn text_removes_dangerous_schemes() {
        assert_eq!(sanitize_text("javascript:alert(1)"), "alert(1)");
        assert_eq!(sanitize_text("JaVaScRiPt:x"), "x");
        // removal splicing a new occurrence back together is caught
        assert_eq!(sanitize_text("javajavascript:script:x"), "x");
    }

    #[test]
    fn body_keeps_allowed_tags_bare() {
        assert_eq!(
            sanitize_message_body("<b>bold</b> and <em>em</em> and <br/>"),
            "<b>bold</b> and <em>em</em> and <br/>"
        );
        assert_eq!(sanitize_message_body("<B>shout</B>"), "<b>shout</b>");
    }

    #[test]
    fn body_escapes_everything_else() {
        assert_eq!(
            sanitize_message_body("<script>x</script>"),
            "&lt;script&gt;x&lt;/script&gt;"
        );
        // attributes disqualify even an allowlisted tag
        assert_eq!(
            sanitize_message_body("<b class=\"x\">y</b>"),
            "&lt;b class=&quot;x&quot;&gt;y</b>"
        );
    }

    #[test]
    fn body_strips_event_handlers() {
        assert_eq!(sanitize_message_body("x onclick=alert(1) y"), "x alert(1) y");
        assert_eq!(sanitize_message_body("x onmouseover = f y"), "x  f y");
    }

    #[test]
    fn room_name_clamps_to_100_chars() {
        let long = "r".repeat(250);
        assert_eq!(sanitize_room_name(&long).chars().count(), 100);
        let short = "general";
        assert_eq!(sanitize_room_name(short), "general");
    }

    #[test]
    fn room_name_never_severs_an_entity() {
        // 98 chars + "&" would escape to 98 + "&amp;" = 103, clamped at 100
        // mid-entity; the clamp must drop the partial entity entirely
        let input = format!("{}&", "a".repeat(98));
        let out = sanitize_room_name(&input);
        assert_fixed_point(sanitize_room_name, &input);
        assert!(!out.ends_with('&') || out.ends_with("&amp;"));
    }

    #[test]
    fn sanitizers_are_idempotent() {
        let samples = [
            "hello world",
            "<script>alert('xss')</script>",
            "<b>bold</b> & <i>italic</i>",
            "javascript:evil() data:text/html vbscript:x",
            "a onclick=b onload = c",
            "quotes \" and ' and & ampersand",
            "already &amp; escaped &lt;tag&gt; &#x27;q&#x27;",
            "  padded  ",
            "<unclosed",
            "mixed <B>CASE</b> <BR/>",
        ];
        for s in samples {
            assert_fixed_point(sanitize_text, s);
            assert_fixed_point(sanitize_message_body, s);
            assert_fixed_point(sanitize_room_name, s);
        }
    }
}
