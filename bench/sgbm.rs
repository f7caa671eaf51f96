use criterion::{black_box, criterion_group, criterion_main, Criterion};

use image::GrayImage;
use rand::{rngs::StdRng, Rng, SeedableRng};
use stereo_depth::prelude::*;

fn textured_frame(width: u32, height: u32, shift: u32) -> StereoFrame {
    let mut rng = StdRng::seed_from_u64(7);
    let left = GrayImage::from_fn(width, height, |_, _| image::Luma([rng.gen_range(0u8..=255)]));
    let right = GrayImage::from_fn(width, height, |x, y| {
        *left.get_pixel((x + shift).min(width - 1), y)
    });

    StereoFrame::new(left, right).unwrap()
}

fn sgbm_bench(c: &mut Criterion) {
    // Build frame
    let frame = textured_frame(320, 240, 12);

    for (name, mode) in [
        ("sgbm 320x240", SgbmMode::Sgbm),
        ("sgbm_3way 320x240", SgbmMode::Sgbm3Way),
        ("hh 320x240", SgbmMode::Hh)
    ] {
        // Build disparity alg
        let mut disp = Sgbm::new(SgbmConfig {
            num_disparities: 32,
            mode,
            ..SgbmConfig::default()
        }).unwrap();

        // Benchmark compute function
        c.bench_function(name, |b| b.iter(|| disp.compute(black_box(&frame))));
    }
}

criterion_group!(benches, sgbm_bench);
criterion_main!(benches);
