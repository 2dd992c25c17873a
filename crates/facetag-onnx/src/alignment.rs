//! Five-point face alignment to the 112x112 ArcFace template.
//!
//! Fits a similarity transform (scale, rotation, translation) from the
//! detected landmarks to the reference template by least squares, then
//! resamples the face with bilinear interpolation.

pub const ALIGNED_SIZE: usize = 112;

/// InsightFace reference landmarks for a 112x112 crop.
const TEMPLATE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Similarity transform `dst = [a -b; b a] * src + [tx; ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` onto `dst`.
    ///
    /// Each point pair contributes the rows `[sx, -sy, 1, 0]` and
    /// `[sy, sx, 0, 1]`; the normal equations are solved directly.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let mut ata = [[0.0f32; 4]; 4];
        let mut atb = [0.0f32; 4];

        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            for (row, rhs) in [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)] {
                for j in 0..4 {
                    for k in 0..4 {
                        ata[j][k] += row[j] * row[k];
                    }
                    atb[j] += row[j] * rhs;
                }
            }
        }

        match solve4(ata, atb) {
            Some([a, b, tx, ty]) => Self { a, b, tx, ty },
            None => Self {
                a: 1.0,
                b: 0.0,
                tx: 0.0,
                ty: 0.0,
            },
        }
    }

    /// Source position that maps onto `(x, y)`.
    fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Gaussian elimination with partial pivoting; `None` if singular.
#[allow(clippy::needless_range_loop)]
fn solve4(mut m: [[f32; 4]; 4], mut v: [f32; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot = (col..4).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        m.swap(col, pivot);
        v.swap(col, pivot);
        if m[col][col].abs() < 1e-12 {
            return None;
        }
        for row in col + 1..4 {
            let f = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= f * m[col][k];
            }
            v[row] -= f * v[col];
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = (i + 1..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (v[i] - tail) / m[i][i];
    }
    Some(x)
}

/// Warp the face described by `landmarks` into a 112x112 grayscale crop.
///
/// Pixels that fall outside the source image are black.
pub fn align_face(gray: &[u8], width: u32, height: u32, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let (w, h) = (width as i64, height as i64);
    let transform = Similarity::estimate(landmarks, &TEMPLATE_112);
    let mut out = vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE];

    let sample = |x: i64, y: i64| -> f32 {
        if (0..w).contains(&x) && (0..h).contains(&y) {
            gray[(y * w + x) as usize] as f32
        } else {
            0.0
        }
    };

    for oy in 0..ALIGNED_SIZE {
        for ox in 0..ALIGNED_SIZE {
            let Some((sx, sy)) = transform.invert_point(ox as f32, oy as f32) else {
                return out;
            };
            let (x0, y0) = (sx.floor() as i64, sy.floor() as i64);
            let (fx, fy) = (sx - x0 as f32, sy - y0 as f32);

            let value = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;
            out[oy * ALIGNED_SIZE + ox] = value.round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_fit_is_identity() {
        let t = Similarity::estimate(&TEMPLATE_112, &TEMPLATE_112);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_double_size_face_halves_scale() {
        let src = TEMPLATE_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let t = Similarity::estimate(&src, &TEMPLATE_112);
        assert!((t.a - 0.5).abs() < 1e-3, "a = {}", t.a);
        assert!(t.b.abs() < 1e-3);
    }

    #[test]
    fn test_invert_point_roundtrip() {
        let t = Similarity {
            a: 0.5,
            b: 0.25,
            tx: 3.0,
            ty: -7.0,
        };
        let (sx, sy) = (40.0f32, 12.0f32);
        let dx = t.a * sx - t.b * sy + t.tx;
        let dy = t.b * sx + t.a * sy + t.ty;
        let (rx, ry) = t.invert_point(dx, dy).unwrap();
        assert!((rx - sx).abs() < 1e-3 && (ry - sy).abs() < 1e-3);
    }

    #[test]
    fn test_solve4_singular() {
        assert_eq!(solve4([[0.0; 4]; 4], [1.0; 4]), None);
    }

    #[test]
    fn test_align_output_size() {
        let gray = vec![128u8; 640 * 480];
        let aligned = align_face(&gray, 640, 480, &TEMPLATE_112);
        assert_eq!(aligned.len(), ALIGNED_SIZE * ALIGNED_SIZE);
        assert_eq!(aligned[56 * ALIGNED_SIZE + 56], 128);
    }

    #[test]
    fn test_landmark_lands_on_template() {
        let (w, h) = (200usize, 200usize);
        let mut gray = vec![0u8; w * h];
        let landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        // Bright 5x5 patch on the left eye.
        for y in 58..63 {
            for x in 78..83 {
                gray[y * w + x] = 255;
            }
        }

        let aligned = align_face(&gray, w as u32, h as u32, &landmarks);
        let (ex, ey) = (TEMPLATE_112[0].0.round() as usize, TEMPLATE_112[0].1.round() as usize);
        let peak = (ey - 1..=ey + 1)
            .flat_map(|y| (ex - 1..=ex + 1).map(move |x| (x, y)))
            .map(|(x, y)| aligned[y * ALIGNED_SIZE + x])
            .max()
            .unwrap();
        assert!(peak > 100, "expected bright patch near ({ex}, {ey}), max={peak}");
    }
}
