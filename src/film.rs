use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{ensure, Context};

use crate::math::is_finite;
use crate::{Float, Vec3f};

/// Shared radiance buffer. Pixels are stored as raw f32 bits in atomics so
/// that `splat_pixel` can accumulate from many workers while `set_pixel`
/// remains a plain store for partitioned writers.
///
/// Pixel (0, 0) is the bottom-left of the image, matching the raster
/// convention of `Scene::primary_ray`.
pub struct Film {
    w: u32,
    h: u32,
    data: Vec<[AtomicU32; 3]>,
}

impl Film {
    pub fn new(w: u32, h: u32) -> anyhow::Result<Self> {
        ensure!(w > 0 && h > 0, "invalid film dimensions {}x{}", w, h);
        let mut data = Vec::with_capacity((w * h) as usize);
        for _ in 0..w * h {
            data.push([AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)]);
        }
        Ok(Self { w, h, data })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.w, self.h)
    }

    pub fn aspect(&self) -> Float {
        self.w as Float / self.h as Float
    }

    pub fn clear(&self) {
        for px in &self.data {
            for c in px {
                c.store(0, Ordering::Relaxed);
            }
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.w && y < self.h);
        (y * self.w + x) as usize
    }

    /// Overwrite a pixel. Exact readback; callers must partition pixels so
    /// each is written by one worker.
    pub fn set_pixel(&self, x: u32, y: u32, v: Vec3f) {
        let px = &self.data[self.index(x, y)];
        px[0].store(v.x.to_bits(), Ordering::Relaxed);
        px[1].store(v.y.to_bits(), Ordering::Relaxed);
        px[2].store(v.z.to_bits(), Ordering::Relaxed);
    }

    /// Add into a pixel. Safe under concurrent writers to the same pixel.
    /// Non-finite contributions are dropped rather than poisoning the sum.
    pub fn splat_pixel(&self, x: u32, y: u32, v: Vec3f) {
        if !is_finite(v) {
            return;
        }
        let px = &self.data[self.index(x, y)];
        atomic_add(&px[0], v.x);
        atomic_add(&px[1], v.y);
        atomic_add(&px[2], v.z);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec3f {
        let px = &self.data[self.index(x, y)];
        Vec3f::new(
            Float::from_bits(px[0].load(Ordering::Relaxed)),
            Float::from_bits(px[1].load(Ordering::Relaxed)),
            Float::from_bits(px[2].load(Ordering::Relaxed)),
        )
    }

    /// Row-major snapshot (bottom row first).
    pub fn to_vec(&self) -> Vec<Vec3f> {
        let mut out = Vec::with_capacity(self.data.len());
        for y in 0..self.h {
            for x in 0..self.w {
                out.push(self.pixel(x, y));
            }
        }
        out
    }

    /// Write a little-endian PFM, scanlines top to bottom.
    pub fn save_pfm<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("creating output image {}", path.display()))?;
        let mut out = BufWriter::new(file);
        write!(out, "PF\n{} {}\n-1.0\n", self.w, self.h)?;
        for y in (0..self.h).rev() {
            for x in 0..self.w {
                let v = self.pixel(x, y);
                out.write_all(&v.x.to_le_bytes())?;
                out.write_all(&v.y.to_le_bytes())?;
                out.write_all(&v.z.to_le_bytes())?;
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Gamma-corrected 8-bit preview.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let mut img = image::RgbImage::new(self.w, self.h);
        for y in 0..self.h {
            for x in 0..self.w {
                let v = self.pixel(x, self.h - 1 - y);
                img.put_pixel(x, y, image::Rgb([to_srgb(v.x), to_srgb(v.y), to_srgb(v.z)]));
            }
        }
        img.save(path)
            .with_context(|| format!("writing preview image {}", path.display()))?;
        Ok(())
    }
}

fn atomic_add(cell: &AtomicU32, value: Float) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let next = Float::from_bits(current) + value;
        match cell.compare_exchange_weak(
            current,
            next.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

fn to_srgb(v: Float) -> u8 {
    let v = v.max(0.0).min(1.0).powf(1.0 / 2.2);
    (v * 255.0 + 0.5) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    #[test]
    fn set_pixel_reads_back_exactly() {
        let film = Film::new(10, 10).unwrap();
        let v = Vec3f::new(0.123, 4.5, -0.75);
        film.set_pixel(3, 7, v);
        assert_eq!(film.pixel(3, 7), v);
        assert_eq!(film.pixel(0, 0), Vec3f::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn splat_accumulates_in_any_order() {
        let a = Vec3f::new(0.25, 1.5, 0.0);
        let b = Vec3f::new(1.0, 0.125, 2.0);

        let film = Film::new(2, 2).unwrap();
        film.splat_pixel(1, 1, a);
        film.splat_pixel(1, 1, b);
        let ab = film.pixel(1, 1);

        let film = Film::new(2, 2).unwrap();
        film.splat_pixel(1, 1, b);
        film.splat_pixel(1, 1, a);
        let ba = film.pixel(1, 1);

        assert_abs_diff_eq!(ab.x, ba.x, epsilon = 1e-6);
        assert_abs_diff_eq!(ab.y, ba.y, epsilon = 1e-6);
        assert_abs_diff_eq!(ab.z, ba.z, epsilon = 1e-6);
    }

    #[test]
    fn splat_is_safe_under_concurrent_writers() {
        let film = Arc::new(Film::new(1, 1).unwrap());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let film = Arc::clone(&film);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        film.splat_pixel(0, 0, Vec3f::new(1.0, 0.5, 0.25));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let v = film.pixel(0, 0);
        assert_abs_diff_eq!(v.x, 8000.0, epsilon = 0.5);
        assert_abs_diff_eq!(v.y, 4000.0, epsilon = 0.5);
        assert_abs_diff_eq!(v.z, 2000.0, epsilon = 0.5);
    }

    #[test]
    fn splat_drops_non_finite_contributions() {
        let film = Film::new(1, 1).unwrap();
        film.splat_pixel(0, 0, Vec3f::new(1.0, 1.0, 1.0));
        film.splat_pixel(0, 0, Vec3f::new(Float::NAN, 0.0, 0.0));
        film.splat_pixel(0, 0, Vec3f::new(0.0, INFINITY_F, 0.0));
        assert_eq!(film.pixel(0, 0), Vec3f::new(1.0, 1.0, 1.0));
    }

    const INFINITY_F: Float = std::f32::INFINITY;

    #[test]
    fn clear_zeroes_every_pixel() {
        let film = Film::new(4, 3).unwrap();
        for y in 0..3 {
            for x in 0..4 {
                film.set_pixel(x, y, Vec3f::new(1.0, 2.0, 3.0));
            }
        }
        film.clear();
        assert!(film.to_vec().iter().all(|v| *v == Vec3f::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn rejects_degenerate_dimensions() {
        assert!(Film::new(0, 4).is_err());
        assert!(Film::new(4, 0).is_err());
    }

    #[test]
    fn aspect_ratio() {
        let film = Film::new(16, 9).unwrap();
        assert_abs_diff_eq!(film.aspect(), 16.0 / 9.0, epsilon = 1e-6);
    }
}
