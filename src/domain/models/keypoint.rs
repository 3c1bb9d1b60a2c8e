//! Keypoint tags and composite keys for local-feature collections
//!
//! Local-feature models store up to `cardinality` descriptors per image.
//! Each row's primary key is the composite `url#x_y_angle`, where the
//! position part encodes the keypoint coordinates and orientation, floats
//! rounded to two decimals and joined by `_`.

use crate::domain::errors::{CommandError, CommandResult};

/// Separator between the url and the position part of a composite key.
pub const KEY_SEPARATOR: char = '#';

/// A keypoint location in a reversible textual form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeypointTag {
    /// Keypoint x coordinate, in pixels of the (possibly resized) image.
    pub x: f64,
    /// Keypoint y coordinate.
    pub y: f64,
    /// Keypoint orientation, in degrees.
    pub angle: f64,
}

impl KeypointTag {
    /// Creates a tag from raw keypoint values.
    #[must_use]
    pub const fn new(x: f64, y: f64, angle: f64) -> Self {
        Self { x, y, angle }
    }

    /// Encodes the tag as `x_y_angle` with two-decimal rounding.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{:.2}_{:.2}_{:.2}", self.x, self.y, self.angle)
    }

    /// Parses a tag from its encoded form.
    ///
    /// Only the first two components are required downstream (the match
    /// positions fed to the homography fit), but all three are parsed so
    /// the encoding stays reversible.
    ///
    /// # Errors
    ///
    /// Returns a server error when the position part is not three
    /// `_`-separated floats. Keys are only ever written by this crate, so a
    /// malformed suffix means a corrupted collection, not a client mistake.
    pub fn parse(encoded: &str) -> CommandResult<Self> {
        let mut parts = encoded.split('_').map(str::parse::<f64>);
        let mut next = |name: &str| {
            parts
                .next()
                .and_then(Result::ok)
                .ok_or_else(|| CommandError::server(format!("Malformed keypoint tag '{encoded}': missing {name}")))
        };
        let x = next("x")?;
        let y = next("y")?;
        let angle = next("angle")?;
        Ok(Self { x, y, angle })
    }

    /// The (x, y) position of the keypoint.
    #[must_use]
    pub const fn position(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Builds the composite primary key for one descriptor of one image.
#[must_use]
pub fn composite_key(url: &str, tag: &KeypointTag) -> String {
    format!("{url}{KEY_SEPARATOR}{}", tag.encode())
}

/// Splits a composite key into its url part and its encoded position part.
///
/// Keys of global-feature collections carry no separator; those return the
/// whole key as the url part and `None` for the position.
#[must_use]
pub fn split_composite_key(key: &str) -> (&str, Option<&str>) {
    key.split_once(KEY_SEPARATOR)
        .map_or((key, None), |(url, pos)| (url, Some(pos)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_rounds_to_two_decimals() {
        let tag = KeypointTag::new(256.357, 319.855, 190.764);
        assert_eq!(tag.encode(), "256.36_319.86_190.76");
    }

    #[test]
    fn test_parse_round_trip() {
        let tag = KeypointTag::parse("256.36_319.86_190.76").expect("valid tag");
        assert_eq!(tag.position(), [256.36, 319.86]);
        assert_eq!(tag.encode(), "256.36_319.86_190.76");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(KeypointTag::parse("not_a_tag").is_err());
        assert!(KeypointTag::parse("1.0_2.0").is_err());
        assert!(KeypointTag::parse("").is_err());
    }

    #[test]
    fn test_composite_key_round_trip() {
        let tag = KeypointTag::new(12.0, 34.5, 180.0);
        let key = composite_key("http://example.com/a.jpg", &tag);
        assert_eq!(key, "http://example.com/a.jpg#12.00_34.50_180.00");

        let (url, pos) = split_composite_key(&key);
        assert_eq!(url, "http://example.com/a.jpg");
        assert_eq!(pos, Some("12.00_34.50_180.00"));
    }

    #[test]
    fn test_split_plain_url() {
        let (url, pos) = split_composite_key("http://example.com/a.jpg");
        assert_eq!(url, "http://example.com/a.jpg");
        assert_eq!(pos, None);
    }
}
