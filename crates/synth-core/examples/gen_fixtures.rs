//! Generator of synthetic wallpapers and window screenshots
//!
//! Usage: cargo run -p synth-core --example gen_fixtures [output_dir]
//!
//! Writes `<out>/wallpapers/*.png` and `<out>/foregrounds_train/<class>/*.png`
//! (plus `distractors/`), enough to try `window-synth generate` end to end.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CLASSES: [(&str, [u8; 3]); 3] = [
    ("ChatGPT", [16, 163, 127]),
    ("Claude", [204, 120, 92]),
    ("Gemini", [66, 133, 244]),
];

fn wallpaper(rng: &mut StdRng, width: u32, height: u32) -> RgbaImage {
    let from: [u8; 3] = rng.gen();
    let to: [u8; 3] = rng.gen();
    let mut img = RgbaImage::from_fn(width, height, |x, y| {
        let t = (x + y) as f32 / (width + height) as f32;
        let mix = |a: u8, b: u8| (f32::from(a) * (1.0 - t) + f32::from(b) * t) as u8;
        Rgba([mix(from[0], to[0]), mix(from[1], to[1]), mix(from[2], to[2]), 255])
    });

    // Desktop icons
    for _ in 0..rng.gen_range(3..12) {
        let size = rng.gen_range(24..64);
        let x0 = rng.gen_range(0..width - size);
        let y0 = rng.gen_range(0..height - size);
        let color = Rgba([rng.gen(), rng.gen(), rng.gen(), 255]);
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                img.put_pixel(x, y, color);
            }
        }
    }
    img
}

fn window(rng: &mut StdRng, width: u32, height: u32, accent: [u8; 3]) -> RgbaImage {
    let title_bar = height / 12;
    let sidebar = width / 5;
    let mut img = RgbaImage::from_fn(width, height, |x, y| {
        if y < title_bar {
            Rgba([32, 33, 36, 255])
        } else if x < sidebar {
            Rgba([accent[0] / 2, accent[1] / 2, accent[2] / 2, 255])
        } else {
            Rgba([248, 248, 246, 255])
        }
    });

    // Message bubbles
    let mut y = title_bar + 12;
    while y + 30 < height {
        let bubble_h = rng.gen_range(14..40).min(height - y - 10);
        let left = rng.gen_bool(0.5);
        let bubble_w = rng.gen_range((width - sidebar) / 4..(width - sidebar) * 3 / 4);
        let x0 = if left { sidebar + 10 } else { width - bubble_w - 10 };
        let color = if left { [230, 230, 230] } else { accent };
        for by in y..y + bubble_h {
            for bx in x0..x0 + bubble_w {
                img.put_pixel(bx, by, Rgba([color[0], color[1], color[2], 255]));
            }
        }
        y += bubble_h + rng.gen_range(6..20);
    }

    // Transparent rounded corners
    let r = 6u32;
    for cy in 0..r {
        for cx in 0..r {
            let (dx, dy) = (r - cx, r - cy);
            if dx * dx + dy * dy > r * r {
                for (x, y) in [
                    (cx, cy),
                    (width - 1 - cx, cy),
                    (cx, height - 1 - cy),
                    (width - 1 - cx, height - 1 - cy),
                ] {
                    img.put_pixel(x, y, Rgba([0, 0, 0, 0]));
                }
            }
        }
    }
    img
}

fn save(img: &RgbaImage, path: &Path) -> anyhow::Result<()> {
    img.save(path)?;
    println!("  Created {}", path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let out = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dataset"));
    let mut rng = StdRng::seed_from_u64(0);

    println!("Generating fixtures in {}", out.display());

    let wallpapers = out.join("wallpapers");
    fs::create_dir_all(&wallpapers)?;
    for i in 0..30 {
        let (w, h) = [(1920, 1080), (1280, 720), (1440, 900), (1280, 1024)][i % 4];
        save(&wallpaper(&mut rng, w, h), &wallpapers.join(format!("wall_{i:03}.png")))?;
    }

    let foregrounds = out.join("foregrounds_train");
    for (class, accent) in CLASSES {
        let dir = foregrounds.join(class);
        fs::create_dir_all(&dir)?;
        for i in 0..4 {
            let w = rng.gen_range(600..1400);
            let h = rng.gen_range(400..900);
            save(&window(&mut rng, w, h, accent), &dir.join(format!("{class}_{i}.png")))?;
        }
    }

    let distractors = foregrounds.join("distractors");
    fs::create_dir_all(&distractors)?;
    for i in 0..6 {
        let accent: [u8; 3] = rng.gen();
        let w = rng.gen_range(300..900);
        let h = rng.gen_range(200..700);
        save(&window(&mut rng, w, h, accent), &distractors.join(format!("other_{i}.png")))?;
    }

    println!(
        "Done! Run: window-synth generate --backgrounds {} --foregrounds {}",
        wallpapers.display(),
        foregrounds.display()
    );
    Ok(())
}
