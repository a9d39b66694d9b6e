//! Integration test: key a generated product shot, refine its fringe,
//! and check the cutout survives a PNG round trip.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cutout_pipeline::{Color3, CutoutConfig, MatteSource, RgbaImage, decode, process};

const SUBJECT: [u8; 4] = [40, 90, 200, 255];
const FRINGE: [u8; 4] = [170, 185, 230, 128];
const BACKDROP: [u8; 4] = [245, 245, 245, 255];

/// A 32x32 blue square on a flat backdrop, ringed by a one-pixel
/// half-transparent fringe still tinted by the backdrop.
fn product_shot() -> RgbaImage {
    RgbaImage::from_fn(64, 64, |x, y| {
        if (16..48).contains(&x) && (16..48).contains(&y) {
            image::Rgba(SUBJECT)
        } else if (15..49).contains(&x) && (15..49).contains(&y) {
            image::Rgba(FRINGE)
        } else {
            image::Rgba(BACKDROP)
        }
    })
}

fn distance_to_subject(pixel: &image::Rgba<u8>) -> u32 {
    Color3::from_rgba(pixel).manhattan(Color3::from_rgba(&image::Rgba(SUBJECT)))
}

#[test]
fn keyed_and_refined_cutout() {
    let png = decode::encode_png(&product_shot()).unwrap();
    let cutout = process(&png, MatteSource::Keyed, &CutoutConfig::default())
        .expect("pipeline should succeed");
    let unrefined = process(
        &png,
        MatteSource::Keyed,
        &CutoutConfig {
            refine_edges: false,
            ..CutoutConfig::default()
        },
    )
    .unwrap();

    assert_eq!(cutout.dimensions(), (64, 64));
    // Backdrop is gone, subject centre is untouched.
    assert_eq!(cutout.get_pixel(0, 0).0[3], 0);
    assert_eq!(cutout.get_pixel(63, 63).0[3], 0);
    assert_eq!(cutout.get_pixel(32, 32).0, SUBJECT);

    let opaque = cutout.pixels().filter(|p| p.0[3] == 255).count();
    let transparent = cutout.pixels().filter(|p| p.0[3] == 0).count();
    assert_eq!(opaque, 32 * 32, "subject should stay solid");
    assert!(transparent > 2000, "expected keyed backdrop, got {transparent}");

    // Keying alone leaves the fringe as it was.
    assert_eq!(unrefined.get_pixel(48, 32).0, FRINGE);
    assert_ne!(cutout, unrefined, "refinement should change the fringe");

    // Refinement pulls the fringe colour toward the subject and fades it.
    let refined = cutout.get_pixel(48, 32);
    let raw = unrefined.get_pixel(48, 32);
    assert!(
        distance_to_subject(refined) < distance_to_subject(raw),
        "fringe {refined:?} not closer to subject than {raw:?}"
    );
    assert!(refined.0[3] > 0 && refined.0[3] < FRINGE[3], "got {refined:?}");

    // The cutout survives encoding for the host.
    let bytes = decode::encode_png(&cutout).unwrap();
    let reloaded = decode::decode_rgba(&bytes).unwrap();
    assert_eq!(reloaded, cutout);
}
