//! Colors and blending rules as written in command scripts.

use serde::{Deserialize, Serialize};

use crate::error::{QdError, QdResult};

/// An RGBA color with straight (non-premultiplied) 8-bit alpha, 255 = opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse a script color.
    ///
    /// Accepted forms:
    /// - `#RRGGBB` (opaque)
    /// - `#AARRGGBB` where `AA` is a 0-127 transparency (0 = opaque, 127 = transparent)
    /// - `r,g,b` or `r,g,b,a` with the same 0-127 transparency scale
    /// - a color name (`red`, `black`, ...) or `none`/`transparent`
    pub fn parse(s: &str) -> QdResult<Self> {
        let unknown = || QdError::UnknownColor(s.to_string());

        if let Some(hex) = s.strip_prefix('#') {
            let byte = |k: usize| u8::from_str_radix(&hex[k..k + 2], 16).map_err(|_| unknown());
            return match hex.len() {
                6 => Ok(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
                8 => {
                    let transparency = byte(0)?;
                    if transparency > 127 {
                        return Err(unknown());
                    }
                    Ok(Color::rgba(
                        byte(2)?,
                        byte(4)?,
                        byte(6)?,
                        alpha_from_transparency(transparency),
                    ))
                }
                _ => Err(unknown()),
            };
        }

        if s.contains(',') {
            let parts: Vec<u8> = s
                .split(',')
                .map(|p| p.trim().parse::<u8>())
                .collect::<Result<_, _>>()
                .map_err(|_| unknown())?;
            return match parts.as_slice() {
                [r, g, b] => Ok(Color::rgb(*r, *g, *b)),
                [r, g, b, t] if *t <= 127 => Ok(Color::rgba(*r, *g, *b, alpha_from_transparency(*t))),
                _ => Err(unknown()),
            };
        }

        named_color(s).ok_or_else(unknown)
    }

    /// Linear interpolation between two colors, `t` in `[0, 1]`.
    pub fn interpolate(&self, other: &Color, t: f64) -> Color {
        let t = t.clamp(0.0, 1.0);
        let lerp_u8 =
            |a: u8, b: u8| -> u8 { ((a as f64) * (1.0 - t) + (b as f64) * t).round() as u8 };
        Color {
            r: lerp_u8(self.r, other.r),
            g: lerp_u8(self.g, other.g),
            b: lerp_u8(self.b, other.b),
            a: lerp_u8(self.a, other.a),
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }
}

/// Convert the 0-127 transparency scale of scripts to 8-bit alpha.
fn alpha_from_transparency(t: u8) -> u8 {
    (255 - (t as u32 * 255 + 63) / 127) as u8
}

fn named_color(name: &str) -> Option<Color> {
    let c = match name.to_lowercase().as_str() {
        "none" | "transparent" => Color::TRANSPARENT,
        "black" => Color::BLACK,
        "white" => Color::WHITE,
        "red" => Color::rgb(255, 0, 0),
        "green" => Color::rgb(0, 128, 0),
        "lime" => Color::rgb(0, 255, 0),
        "blue" => Color::rgb(0, 0, 255),
        "yellow" => Color::rgb(255, 255, 0),
        "cyan" | "aqua" => Color::rgb(0, 255, 255),
        "magenta" | "fuchsia" => Color::rgb(255, 0, 255),
        "orange" => Color::rgb(255, 165, 0),
        "purple" => Color::rgb(128, 0, 128),
        "brown" => Color::rgb(165, 42, 42),
        "navy" => Color::rgb(0, 0, 128),
        "maroon" => Color::rgb(128, 0, 0),
        "olive" => Color::rgb(128, 128, 0),
        "teal" => Color::rgb(0, 128, 128),
        "silver" => Color::rgb(192, 192, 192),
        "gray" | "grey" => Color::rgb(128, 128, 128),
        "lightgray" | "lightgrey" => Color::rgb(211, 211, 211),
        "darkgray" | "darkgrey" => Color::rgb(169, 169, 169),
        _ => return None,
    };
    Some(c)
}

/// Porter-Duff and separable blending rules accepted by the script commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendRule {
    Clear,
    Copy,
    Keep,
    Over,
    Under,
    In,
    KeepIn,
    Out,
    KeepOut,
    Atop,
    KeepAtop,
    Xor,
    Plus,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Difference,
    Exclusion,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    /// Paint only where the destination is opaque.
    OnOpaque,
    /// Paint only where the destination is transparent.
    OnTransparent,
}

impl BlendRule {
    pub fn parse(s: &str) -> QdResult<Self> {
        let rule = match s {
            "Clear" => BlendRule::Clear,
            "Copy" => BlendRule::Copy,
            "Keep" => BlendRule::Keep,
            "Over" => BlendRule::Over,
            "Under" => BlendRule::Under,
            "In" => BlendRule::In,
            "KeepIn" => BlendRule::KeepIn,
            "Out" => BlendRule::Out,
            "KeepOut" => BlendRule::KeepOut,
            "Atop" => BlendRule::Atop,
            "KeepAtop" => BlendRule::KeepAtop,
            "Xor" => BlendRule::Xor,
            "Plus" | "Add" => BlendRule::Plus,
            "Multiply" => BlendRule::Multiply,
            "Screen" => BlendRule::Screen,
            "Overlay" => BlendRule::Overlay,
            "Darken" => BlendRule::Darken,
            "Lighten" => BlendRule::Lighten,
            "Difference" => BlendRule::Difference,
            "Exclusion" => BlendRule::Exclusion,
            "ColorDodge" => BlendRule::ColorDodge,
            "ColorBurn" => BlendRule::ColorBurn,
            "HardLight" => BlendRule::HardLight,
            "SoftLight" => BlendRule::SoftLight,
            "OnOpaque" => BlendRule::OnOpaque,
            "OnTransparent" => BlendRule::OnTransparent,
            _ => return Err(QdError::UnknownRule(s.to_string())),
        };
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_rgb() {
        assert_eq!(Color::parse("#FF8000").unwrap(), Color::rgb(255, 128, 0));
    }

    #[test]
    fn test_parse_hex_with_transparency() {
        assert_eq!(Color::parse("#7F000000").unwrap().a, 0);
        assert_eq!(Color::parse("#00FFFFFF").unwrap(), Color::WHITE);
    }

    #[test]
    fn test_parse_triplet_and_names() {
        assert_eq!(Color::parse("10,20,30").unwrap(), Color::rgb(10, 20, 30));
        assert_eq!(Color::parse("red").unwrap(), Color::rgb(255, 0, 0));
        assert!(Color::parse("none").unwrap().is_transparent());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Color::parse("#12").is_err());
        assert!(Color::parse("chartreuse-ish").is_err());
        assert!(Color::parse("#FF000000").is_err());
    }

    #[test]
    fn test_interpolate_endpoints() {
        let red = Color::rgb(255, 0, 0);
        let blue = Color::rgb(0, 0, 255);
        assert_eq!(red.interpolate(&blue, 0.0), red);
        assert_eq!(red.interpolate(&blue, 1.0), blue);
        assert_eq!(red.interpolate(&blue, 0.5), Color::rgb(128, 0, 128));
    }

    #[test]
    fn test_blend_rule_parse() {
        assert_eq!(BlendRule::parse("Over").unwrap(), BlendRule::Over);
        assert_eq!(BlendRule::parse("Add").unwrap(), BlendRule::Plus);
        assert!(BlendRule::parse("over").is_err());
    }
}
