// CSS-style color strings to plotters colors

use plotters::style::RGBAColor;

/// Used where a series has no color for a data point.
pub const FALLBACK_COLOR: RGBAColor = RGBAColor(0, 0, 0, 0.1);

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(..)`, `rgba(..)` or a common color name.
pub fn parse_color(input: &str) -> Option<RGBAColor> {
    let s = input.trim().to_ascii_lowercase();

    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(body) = s.strip_prefix("rgba(").or_else(|| s.strip_prefix("rgb(")) {
        return parse_functional(body.strip_suffix(')')?);
    }
    named(&s)
}

/// Parse `input`, or fall back when it is absent or unparseable.
pub fn color_or(input: Option<&str>, fallback: RGBAColor) -> RGBAColor {
    input.and_then(parse_color).unwrap_or(fallback)
}

fn parse_hex(hex: &str) -> Option<RGBAColor> {
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            Some(RGBAColor(out[0], out[1], out[2], 1.0))
        }
        6 | 8 => {
            let r = channel(hex.get(0..2)?)?;
            let g = channel(hex.get(2..4)?)?;
            let b = channel(hex.get(4..6)?)?;
            let a = match hex.get(6..8) {
                Some(a) => channel(a)? as f64 / 255.0,
                None => 1.0,
            };
            Some(RGBAColor(r, g, b, a))
        }
        _ => None,
    }
}

fn parse_functional(body: &str) -> Option<RGBAColor> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |s: &str| -> Option<u8> {
        let v: f64 = s.parse().ok()?;
        Some(v.clamp(0.0, 255.0).round() as u8)
    };
    let alpha = match parts.get(3) {
        Some(a) => a.parse::<f64>().ok()?.clamp(0.0, 1.0),
        None => 1.0,
    };
    Some(RGBAColor(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        alpha,
    ))
}

fn named(name: &str) -> Option<RGBAColor> {
    let (r, g, b) = match name {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "cyan" | "aqua" => (0, 255, 255),
        "magenta" | "fuchsia" => (255, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        "lightgray" | "lightgrey" => (211, 211, 211),
        "darkgray" | "darkgrey" => (169, 169, 169),
        "silver" => (192, 192, 192),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        "pink" => (255, 192, 203),
        "brown" => (165, 42, 42),
        "navy" => (0, 0, 128),
        "teal" => (0, 128, 128),
        "maroon" => (128, 0, 0),
        "olive" => (128, 128, 0),
        "steelblue" => (70, 130, 180),
        "transparent" => return Some(RGBAColor(0, 0, 0, 0.0)),
        _ => return None,
    };
    Some(RGBAColor(r, g, b, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(c: RGBAColor) -> (u8, u8, u8, f64) {
        (c.0, c.1, c.2, c.3)
    }

    #[test]
    fn test_palette_strings() {
        let c = parse_color("rgba(54, 162, 235, 0.8)").unwrap();
        assert_eq!(rgba(c), (54, 162, 235, 0.8));
        let c = parse_color("rgba(54, 162, 235, 1)").unwrap();
        assert_eq!(rgba(c), (54, 162, 235, 1.0));
    }

    #[test]
    fn test_hex_forms() {
        assert_eq!(rgba(parse_color("#f0f0f0").unwrap()), (240, 240, 240, 1.0));
        assert_eq!(rgba(parse_color("#fff").unwrap()), (255, 255, 255, 1.0));
        assert_eq!(rgba(parse_color("#4C78A8").unwrap()), (76, 120, 168, 1.0));
        let c = parse_color("#00000000").unwrap();
        assert_eq!(c.3, 0.0);
    }

    #[test]
    fn test_names_and_rgb() {
        assert_eq!(rgba(parse_color("White").unwrap()), (255, 255, 255, 1.0));
        assert_eq!(rgba(parse_color("rgb(1,2,3)").unwrap()), (1, 2, 3, 1.0));
    }

    #[test]
    fn test_invalid_colors() {
        assert!(parse_color("not-a-color").is_none());
        assert!(parse_color("#12").is_none());
        assert!(parse_color("rgba(1,2)").is_none());
        assert_eq!(rgba(color_or(Some("???"), FALLBACK_COLOR)), (0, 0, 0, 0.1));
    }
}
