//! Track metadata extraction for MPRIS property maps.

use dbus::arg::{ArgType, PropMap, RefArg, Variant};

use crate::player::TrackMetadata;

/// Helper to extract a string that might be a single value or the first in an array.
/// MPRIS declares artist/album as arrays of strings, but some players send a single string.
pub fn extract_optional_string(variant: &Variant<Box<dyn RefArg + 'static>>) -> Option<String> {
    match variant.0.arg_type() {
        ArgType::Array => variant
            .0
            .as_iter()
            .and_then(|mut iter| iter.next().and_then(|v| v.as_str()).map(str::to_string)),
        ArgType::String => variant.0.as_str().map(str::to_string),
        _ => None,
    }
}

/// Reads an integer that players send as either `x` or `t`.
pub fn extract_integer(variant: &Variant<Box<dyn RefArg + 'static>>) -> Option<i64> {
    variant
        .0
        .as_i64()
        .or_else(|| variant.0.as_u64().and_then(|v| i64::try_from(v).ok()))
}

/// Extract metadata fields from an MPRIS `Metadata` map. Lengths are microseconds.
pub fn extract_metadata(map: &PropMap) -> TrackMetadata {
    let title = map
        .get("xesam:title")
        .and_then(|v| v.0.as_str())
        .map(str::to_string);
    let artist = map.get("xesam:artist").and_then(extract_optional_string);
    let album = map.get("xesam:album").and_then(extract_optional_string);
    let length = map
        .get("mpris:length")
        .and_then(extract_integer)
        .map(|us| us as f64 / 1_000_000.0);
    TrackMetadata {
        title,
        artist,
        album,
        length,
    }
}
