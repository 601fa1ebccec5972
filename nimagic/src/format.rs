//! Rendering of entry messages carrying one printf-style directive.

use crate::matcher::Value;

/// Renders a message template against the value an entry extracted.
///
/// Installed per rule set via
/// [`MagicSet::set_formatter`](crate::MagicSet::set_formatter); the default
/// is [`PrintfFormatter`].
pub trait Formatter: Send + Sync {
    /// Substitute `value` into the first directive of `template`. A
    /// template without directives is returned verbatim.
    fn format(&self, template: &str, value: Option<&Value>) -> String;
}

/// The default formatter: one `%`-directive per template, in the printf
/// dialect magic databases use (`%s`, `%d`, `%u`, `%x`, `%c`, `%.Ns`, …).
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintfFormatter;

#[derive(Debug, Default)]
struct Directive {
    left_align: bool,
    zero_pad: bool,
    width: usize,
    precision: Option<usize>,
    conv: char,
}

/// Parse the directive after a `%`, returning it and the bytes consumed.
fn parse_directive(spec: &str) -> Option<(Directive, usize)> {
    let mut d = Directive::default();
    let bytes = spec.as_bytes();
    let mut i = 0;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'-' => d.left_align = true,
            b'0' => d.zero_pad = true,
            b'+' | b' ' | b'#' => {}
            _ => break,
        }
        i += 1;
    }
    while let Some(&b) = bytes.get(i) {
        if !b.is_ascii_digit() {
            break;
        }
        d.width = d.width.saturating_mul(10) + (b - b'0') as usize;
        i += 1;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        let mut precision = 0usize;
        while let Some(&b) = bytes.get(i) {
            if !b.is_ascii_digit() {
                break;
            }
            precision = precision.saturating_mul(10) + (b - b'0') as usize;
            i += 1;
        }
        d.precision = Some(precision);
    }
    // length modifiers carry no information at 64-bit extraction width
    while let Some(&b) = bytes.get(i) {
        if !matches!(b, b'l' | b'h' | b'q' | b'j' | b'z' | b't') {
            break;
        }
        i += 1;
    }
    let conv = char::from(*bytes.get(i)?);
    if !matches!(
        conv,
        'd' | 'i' | 'u' | 'o' | 'x' | 'X' | 'c' | 's' | 'e' | 'E' | 'f' | 'g' | 'G'
    ) {
        return None;
    }
    d.conv = conv;
    Some((d, i + 1))
}

fn as_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Int(v)) => *v,
        Some(Value::Float(f)) => *f as i64,
        Some(Value::Bytes(b)) => b.first().copied().map_or(0, i64::from),
        Some(Value::Str(s)) => s.bytes().next().map_or(0, i64::from),
        None => 0,
    }
}

fn as_float(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Float(f)) => *f,
        Some(Value::Int(v)) => *v as f64,
        _ => 0.0,
    }
}

fn as_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::Int(v)) => v.to_string(),
        Some(Value::Float(f)) => f.to_string(),
        Some(Value::Bytes(b)) => String::from_utf8_lossy(b).into_owned(),
        Some(Value::Str(s)) => s.clone(),
        None => String::new(),
    }
}

fn pad(mut s: String, d: &Directive, numeric: bool) -> String {
    if s.len() >= d.width {
        return s;
    }
    let fill = d.width - s.len();
    if d.left_align {
        s.extend(std::iter::repeat(' ').take(fill));
        s
    } else if d.zero_pad && numeric {
        let at = usize::from(s.starts_with('-'));
        s.insert_str(at, &"0".repeat(fill));
        s
    } else {
        let mut out = " ".repeat(fill);
        out.push_str(&s);
        out
    }
}

fn render(d: &Directive, value: Option<&Value>) -> String {
    match d.conv {
        'd' | 'i' => pad(as_int(value).to_string(), d, true),
        'u' => pad((as_int(value) as u64).to_string(), d, true),
        'x' => pad(format!("{:x}", as_int(value) as u64), d, true),
        'X' => pad(format!("{:X}", as_int(value) as u64), d, true),
        'o' => pad(format!("{:o}", as_int(value) as u64), d, true),
        'c' => {
            let c = char::from(as_int(value) as u8);
            pad(c.to_string(), d, false)
        }
        's' => {
            let mut s = as_string(value);
            if let Some(precision) = d.precision {
                s = s.chars().take(precision).collect();
            }
            pad(s, d, false)
        }
        'e' | 'E' => pad(format!("{:e}", as_float(value)), d, true),
        'f' => pad(
            format!("{:.*}", d.precision.unwrap_or(6), as_float(value)),
            d,
            true,
        ),
        'g' | 'G' => pad(as_float(value).to_string(), d, true),
        _ => String::new(),
    }
}

impl Formatter for PrintfFormatter {
    fn format(&self, template: &str, value: Option<&Value>) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut substituted = false;
        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos + 1..];
            if let Some(tail) = rest.strip_prefix('%') {
                out.push('%');
                rest = tail;
                continue;
            }
            match parse_directive(rest) {
                Some((d, consumed)) if !substituted => {
                    out.push_str(&render(&d, value));
                    rest = &rest[consumed..];
                    substituted = true;
                }
                _ => out.push('%'),
            }
        }
        out.push_str(rest);
        out
    }
}
