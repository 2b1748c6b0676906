// Shared vocabulary: the 11 dominant-color categories and the object-label
// domain vocabulary, each with common aliases. Used by the frame-extraction
// stage (bucketing a sampled color into a named category) and by the
// searcher's query preprocessing (spec §4.5: "extract any recognized color
// tokens / object label tokens").

use crate::constants::COLOR_CATEGORIES;
use std::collections::HashMap;

/// Alias → canonical color category. Canonical names also map to
/// themselves so lookups don't need a separate "is it already canonical"
/// check.
fn color_aliases() -> HashMap<&'static str, &'static str> {
    let mut m = HashMap::new();
    for c in COLOR_CATEGORIES {
        m.insert(c, c);
    }
    m.insert("crimson", "red");
    m.insert("maroon", "red");
    m.insert("scarlet", "red");
    m.insert("navy", "blue");
    m.insert("teal", "blue");
    m.insert("cyan", "blue");
    m.insert("turquoise", "blue");
    m.insert("lime", "green");
    m.insert("olive", "green");
    m.insert("violet", "purple");
    m.insert("lavender", "purple");
    m.insert("magenta", "pink");
    m.insert("rose", "pink");
    m.insert("tan", "brown");
    m.insert("beige", "brown");
    m.insert("khaki", "brown");
    m.insert("gold", "yellow");
    m.insert("amber", "orange");
    m.insert("ivory", "white");
    m.insert("cream", "white");
    m.insert("charcoal", "black");
    m.insert("silver", "gray");
    m.insert("grey", "gray");
    m
}

/// Resolve a free-text token to a canonical color category, if it names one.
pub fn resolve_color(token: &str) -> Option<&'static str> {
    color_aliases().get(token.to_lowercase().as_str()).copied()
}

/// The detector's label vocabulary with common plural/synonym aliases. Kept
/// small and representative; a real object detector backend may emit labels
/// outside this list, which still round-trip through detection rows and
/// label-only search (unrecognized tokens just don't get stripped from the
/// free-text query).
fn object_label_aliases() -> HashMap<&'static str, &'static str> {
    let mut m = HashMap::new();
    let canonical = [
        "person", "car", "dog", "cat", "bird", "bicycle", "motorcycle", "boat", "airplane", "bus",
        "train", "truck", "horse", "sheep", "cow", "bottle", "chair", "couch", "table", "laptop",
        "phone", "book", "cake", "balloon", "umbrella", "backpack", "ball", "kite", "surfboard",
        "skateboard",
    ];
    for c in canonical {
        m.insert(c, c);
    }
    m.insert("people", "person");
    m.insert("man", "person");
    m.insert("woman", "person");
    m.insert("kid", "person");
    m.insert("child", "person");
    m.insert("cars", "car");
    m.insert("vehicle", "car");
    m.insert("automobile", "car");
    m.insert("dogs", "dog");
    m.insert("puppy", "dog");
    m.insert("cats", "cat");
    m.insert("kitten", "cat");
    m.insert("birds", "bird");
    m.insert("bike", "bicycle");
    m.insert("bikes", "bicycle");
    m.insert("motorbike", "motorcycle");
    m.insert("plane", "airplane");
    m.insert("airplanes", "airplane");
    m.insert("cellphone", "phone");
    m.insert("smartphone", "phone");
    m.insert("sofa", "couch");
    m.insert("balloons", "balloon");
    m
}

pub fn resolve_object_label(token: &str) -> Option<&'static str> {
    object_label_aliases().get(token.to_lowercase().as_str()).copied()
}

/// Bucket an RGB color into one of the 11 named categories by nearest
/// reference hue/shade. Small, fixed palette rather than a learned model,
/// matching the "small-k clustering, bucketed into 11 named categories"
/// contract in spec §4.4 stage 3.
pub fn bucket_rgb(r: u8, g: u8, b: u8) -> &'static str {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0 / 255.0;
    let chroma = (max - min) / 255.0;

    if chroma < 0.08 {
        return if lightness > 0.9 {
            "white"
        } else if lightness < 0.12 {
            "black"
        } else {
            "gray"
        };
    }

    let hue = rgb_hue_degrees(r, g, b);
    match hue {
        h if h < 15.0 || h >= 345.0 => "red",
        h if h < 45.0 => "orange",
        h if h < 70.0 => "yellow",
        h if h < 170.0 => "green",
        h if h < 200.0 => "blue",
        h if h < 255.0 => "blue",
        h if h < 290.0 => "purple",
        h if h < 345.0 => "pink",
        _ => "gray",
    }
}

fn rgb_hue_degrees(r: f64, g: f64, b: f64) -> f64 {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta == 0.0 {
        return 0.0;
    }
    let hue = if max == r {
        60.0 * (((g - b) / delta) % 6.0)
    } else if max == g {
        60.0 * (((b - r) / delta) + 2.0)
    } else {
        60.0 * (((r - g) / delta) + 4.0)
    };
    if hue < 0.0 {
        hue + 360.0
    } else {
        hue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_color_alias() {
        assert_eq!(resolve_color("crimson"), Some("red"));
        assert_eq!(resolve_color("RED"), Some("red"));
        assert_eq!(resolve_color("teal"), Some("blue"));
    }

    #[test]
    fn unrecognized_token_has_no_color() {
        assert_eq!(resolve_color("spaceship"), None);
    }

    #[test]
    fn resolves_object_label_alias() {
        assert_eq!(resolve_object_label("cars"), Some("car"));
        assert_eq!(resolve_object_label("puppy"), Some("dog"));
    }

    #[test]
    fn buckets_pure_red_as_red() {
        assert_eq!(bucket_rgb(220, 20, 20), "red");
    }

    #[test]
    fn buckets_near_white_as_white() {
        assert_eq!(bucket_rgb(250, 248, 245), "white");
    }

    #[test]
    fn buckets_near_black_as_black() {
        assert_eq!(bucket_rgb(10, 8, 12), "black");
    }
}
