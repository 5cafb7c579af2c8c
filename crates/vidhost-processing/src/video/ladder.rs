//! Rendition ladder selection.

use vidhost_core::models::Resolution;

/// Candidate renditions, largest first.
pub const STANDARD_LADDER: [Resolution; 7] = [
    Resolution::new(3840, 2160),
    Resolution::new(2560, 1440),
    Resolution::new(1920, 1080),
    Resolution::new(1280, 720),
    Resolution::new(854, 480),
    Resolution::new(640, 360),
    Resolution::new(426, 240),
];

/// Always produced, whatever the source size.
pub const FLOOR_RENDITION: Resolution = Resolution::new(256, 144);

/// Every standard rendition that fits within `source` in both dimensions, followed
/// by [`FLOOR_RENDITION`].
pub fn build_ladder(source: Resolution) -> Vec<Resolution> {
    let mut ladder: Vec<Resolution> = STANDARD_LADDER
        .iter()
        .copied()
        .filter(|rung| rung.fits_within(&source))
        .collect();
    ladder.push(FLOOR_RENDITION);
    ladder
}
