//! Per-instance configuration handed from the host to a running scene.
//!
//! A [`PropsRecord`] is always replaced wholesale; fields are never merged
//! between two `updateProps` messages. Records are stored exactly as the
//! host sent them. Interpreting the values (parsing the color, clamping the
//! tuning numbers) is up to the scene builder.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Color used when a record carries no color of its own.
pub const DEFAULT_COLOR: &str = "#202020";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as f32 / 255.0,
            g: ((hex >> 8) & 0xFF) as f32 / 255.0,
            b: (hex & 0xFF) as f32 / 255.0,
            a: 1.0,
        }
    }

    /// Parse a CSS color: `#rgb`, `#rrggbb`, a named color, or one of the
    /// `rgb()`, `rgba()`, `hsl()`, `hsla()` functions. Case and surrounding
    /// whitespace are ignored.
    pub fn parse_css(value: &str) -> Result<Self, PropsError> {
        let invalid = || PropsError::InvalidColor(value.to_string());
        let css = value.trim().to_ascii_lowercase();

        if let Some(digits) = css.strip_prefix('#') {
            return parse_hex(digits).ok_or_else(invalid);
        }
        if css.contains('(') {
            return parse_function(&css).ok_or_else(invalid);
        }
        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == css)
            .map(|(_, hex)| Self::from_hex(*hex))
            .ok_or_else(invalid)
    }

    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
}

fn parse_hex(digits: &str) -> Option<Color> {
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let hex = match digits.len() {
        // #abc expands to #aabbcc
        3 => {
            let expanded: String = digits.chars().flat_map(|c| [c, c]).collect();
            u32::from_str_radix(&expanded, 16).ok()?
        }
        6 => u32::from_str_radix(digits, 16).ok()?,
        _ => return None,
    };
    Some(Color::from_hex(hex))
}

fn parse_function(css: &str) -> Option<Color> {
    let open = css.find('(')?;
    let name = css[..open].trim();
    let body = css[open + 1..].trim_end().strip_suffix(')')?;
    let parts: Vec<&str> = body
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();

    let alpha = match parts.len() {
        3 => 1.0,
        4 => parse_unit(parts[3], 1.0)?,
        _ => return None,
    };

    match name {
        "rgb" | "rgba" => Some(Color::rgba(
            parse_unit(parts[0], 255.0)?,
            parse_unit(parts[1], 255.0)?,
            parse_unit(parts[2], 255.0)?,
            alpha,
        )),
        "hsl" | "hsla" => {
            let degrees: f32 = parts[0].strip_suffix("deg").unwrap_or(parts[0]).parse().ok()?;
            if !degrees.is_finite() {
                return None;
            }
            let (r, g, b) = hsl_to_rgb(
                degrees.rem_euclid(360.0) / 360.0,
                parse_percent(parts[1])?,
                parse_percent(parts[2])?,
            );
            Some(Color::rgba(r, g, b, alpha))
        }
        _ => None,
    }
}

/// A channel given either as a percentage or as a number out of `scale`,
/// clamped to `0..=1`.
fn parse_unit(part: &str, scale: f32) -> Option<f32> {
    let value = match part.strip_suffix('%') {
        Some(percent) => percent.parse::<f32>().ok()? / 100.0,
        None => part.parse::<f32>().ok()? / scale,
    };
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

fn parse_percent(part: &str) -> Option<f32> {
    part.strip_suffix('%')?;
    parse_unit(part, 1.0)
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |t: f32| {
        let t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

const NAMED_COLORS: &[(&str, u32)] = &[
    ("aliceblue", 0xF0F8FF),
    ("antiquewhite", 0xFAEBD7),
    ("aqua", 0x00FFFF),
    ("aquamarine", 0x7FFFD4),
    ("azure", 0xF0FFFF),
    ("beige", 0xF5F5DC),
    ("bisque", 0xFFE4C4),
    ("black", 0x000000),
    ("blanchedalmond", 0xFFEBCD),
    ("blue", 0x0000FF),
    ("blueviolet", 0x8A2BE2),
    ("brown", 0xA52A2A),
    ("burlywood", 0xDEB887),
    ("cadetblue", 0x5F9EA0),
    ("chartreuse", 0x7FFF00),
    ("chocolate", 0xD2691E),
    ("coral", 0xFF7F50),
    ("cornflowerblue", 0x6495ED),
    ("cornsilk", 0xFFF8DC),
    ("crimson", 0xDC143C),
    ("cyan", 0x00FFFF),
    ("darkblue", 0x00008B),
    ("darkcyan", 0x008B8B),
    ("darkgoldenrod", 0xB8860B),
    ("darkgray", 0xA9A9A9),
    ("darkgreen", 0x006400),
    ("darkgrey", 0xA9A9A9),
    ("darkkhaki", 0xBDB76B),
    ("darkmagenta", 0x8B008B),
    ("darkolivegreen", 0x556B2F),
    ("darkorange", 0xFF8C00),
    ("darkorchid", 0x9932CC),
    ("darkred", 0x8B0000),
    ("darksalmon", 0xE9967A),
    ("darkseagreen", 0x8FBC8F),
    ("darkslateblue", 0x483D8B),
    ("darkslategray", 0x2F4F4F),
    ("darkslategrey", 0x2F4F4F),
    ("darkturquoise", 0x00CED1),
    ("darkviolet", 0x9400D3),
    ("deeppink", 0xFF1493),
    ("deepskyblue", 0x00BFFF),
    ("dimgray", 0x696969),
    ("dimgrey", 0x696969),
    ("dodgerblue", 0x1E90FF),
    ("firebrick", 0xB22222),
    ("floralwhite", 0xFFFAF0),
    ("forestgreen", 0x228B22),
    ("fuchsia", 0xFF00FF),
    ("gainsboro", 0xDCDCDC),
    ("ghostwhite", 0xF8F8FF),
    ("gold", 0xFFD700),
    ("goldenrod", 0xDAA520),
    ("gray", 0x808080),
    ("green", 0x008000),
    ("greenyellow", 0xADFF2F),
    ("grey", 0x808080),
    ("honeydew", 0xF0FFF0),
    ("hotpink", 0xFF69B4),
    ("indianred", 0xCD5C5C),
    ("indigo", 0x4B0082),
    ("ivory", 0xFFFFF0),
    ("khaki", 0xF0E68C),
    ("lavender", 0xE6E6FA),
    ("lavenderblush", 0xFFF0F5),
    ("lawngreen", 0x7CFC00),
    ("lemonchiffon", 0xFFFACD),
    ("lightblue", 0xADD8E6),
    ("lightcoral", 0xF08080),
    ("lightcyan", 0xE0FFFF),
    ("lightgoldenrodyellow", 0xFAFAD2),
    ("lightgray", 0xD3D3D3),
    ("lightgreen", 0x90EE90),
    ("lightgrey", 0xD3D3D3),
    ("lightpink", 0xFFB6C1),
    ("lightsalmon", 0xFFA07A),
    ("lightseagreen", 0x20B2AA),
    ("lightskyblue", 0x87CEFA),
    ("lightslategray", 0x778899),
    ("lightslategrey", 0x778899),
    ("lightsteelblue", 0xB0C4DE),
    ("lightyellow", 0xFFFFE0),
    ("lime", 0x00FF00),
    ("limegreen", 0x32CD32),
    ("linen", 0xFAF0E6),
    ("magenta", 0xFF00FF),
    ("maroon", 0x800000),
    ("mediumaquamarine", 0x66CDAA),
    ("mediumblue", 0x0000CD),
    ("mediumorchid", 0xBA55D3),
    ("mediumpurple", 0x9370DB),
    ("mediumseagreen", 0x3CB371),
    ("mediumslateblue", 0x7B68EE),
    ("mediumspringgreen", 0x00FA9A),
    ("mediumturquoise", 0x48D1CC),
    ("mediumvioletred", 0xC71585),
    ("midnightblue", 0x191970),
    ("mintcream", 0xF5FFFA),
    ("mistyrose", 0xFFE4E1),
    ("moccasin", 0xFFE4B5),
    ("navajowhite", 0xFFDEAD),
    ("navy", 0x000080),
    ("oldlace", 0xFDF5E6),
    ("olive", 0x808000),
    ("olivedrab", 0x6B8E23),
    ("orange", 0xFFA500),
    ("orangered", 0xFF4500),
    ("orchid", 0xDA70D6),
    ("palegoldenrod", 0xEEE8AA),
    ("palegreen", 0x98FB98),
    ("paleturquoise", 0xAFEEEE),
    ("palevioletred", 0xDB7093),
    ("papayawhip", 0xFFEFD5),
    ("peachpuff", 0xFFDAB9),
    ("peru", 0xCD853F),
    ("pink", 0xFFC0CB),
    ("plum", 0xDDA0DD),
    ("powderblue", 0xB0E0E6),
    ("purple", 0x800080),
    ("rebeccapurple", 0x663399),
    ("red", 0xFF0000),
    ("rosybrown", 0xBC8F8F),
    ("royalblue", 0x4169E1),
    ("saddlebrown", 0x8B4513),
    ("salmon", 0xFA8072),
    ("sandybrown", 0xF4A460),
    ("seagreen", 0x2E8B57),
    ("seashell", 0xFFF5EE),
    ("sienna", 0xA0522D),
    ("silver", 0xC0C0C0),
    ("skyblue", 0x87CEEB),
    ("slateblue", 0x6A5ACD),
    ("slategray", 0x708090),
    ("slategrey", 0x708090),
    ("snow", 0xFFFAFA),
    ("springgreen", 0x00FF7F),
    ("steelblue", 0x4682B4),
    ("tan", 0xD2B48C),
    ("teal", 0x008080),
    ("thistle", 0xD8BFD8),
    ("tomato", 0xFF6347),
    ("turquoise", 0x40E0D0),
    ("violet", 0xEE82EE),
    ("wheat", 0xF5DEB3),
    ("white", 0xFFFFFF),
    ("whitesmoke", 0xF5F5F5),
    ("yellow", 0xFFFF00),
    ("yellowgreen", 0x9ACD32),
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropsError {
    #[error("unrecognised color `{0}`")]
    InvalidColor(String),
    #[error("`{field}` must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f32 },
}

/// The full configuration blob for one rendered instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropsRecord {
    /// The shirt color as a CSS color string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// An url to an image that is printed onto the shirt.
    #[serde(default, alias = "motif", skip_serializing_if = "Option::is_none")]
    pub decal_url: Option<String>,
    /// How much the camera wobbles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wobble_range: Option<f32>,
    /// How fast the camera wobbles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wobble_speed: Option<f32>,
    /// Scale the decal size by this factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decal_scale: Option<f32>,
    /// Vertical baseline of the decal (shift it up or down).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decal_baseline: Option<f32>,
    /// Disable interaction.
    #[serde(default)]
    pub disabled: bool,
}

impl PropsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn decal_url(mut self, url: impl Into<String>) -> Self {
        self.decal_url = Some(url.into());
        self
    }

    pub fn wobble(mut self, range: f32, speed: f32) -> Self {
        self.wobble_range = Some(range);
        self.wobble_speed = Some(speed);
        self
    }

    pub fn decal_placement(mut self, scale: f32, baseline: f32) -> Self {
        self.decal_scale = Some(scale);
        self.decal_baseline = Some(baseline);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// The parsed color, falling back to [`DEFAULT_COLOR`] when unset.
    pub fn color_rgb(&self) -> Result<Color, PropsError> {
        Color::parse_css(self.color.as_deref().unwrap_or(DEFAULT_COLOR))
    }

    /// The parsed color, or the default color if it does not parse.
    pub fn resolved_color(&self) -> Color {
        self.color_rgb().unwrap_or_else(|err| {
            log::warn!("{err}, using {DEFAULT_COLOR}");
            Color::from_hex(0x202020)
        })
    }

    /// Report values a scene builder is likely to choke on.
    ///
    /// This is advisory: the controller logs the error and still stores the
    /// record as received.
    pub fn validate(&self) -> Result<(), PropsError> {
        self.color_rgb()?;

        let tuning = [
            ("wobbleRange", self.wobble_range),
            ("wobbleSpeed", self.wobble_speed),
            ("decalScale", self.decal_scale),
            ("decalBaseline", self.decal_baseline),
        ];
        for (field, value) in tuning {
            match value {
                Some(value) if !value.is_finite() => {
                    return Err(PropsError::NotFinite { field, value });
                }
                _ => {}
            }
        }
        Ok(())
    }
}
