//! Posture check from a single uploaded image.
//!
//! A [`PoseEstimator`] returns normalized body landmarks (33 points in the
//! BlazePose layout). The checker measures the angle at the left hip between
//! the left shoulder and the left knee, judges it against a fixed 160°
//! threshold, and saves a copy of the image with the skeleton drawn on it.

use async_trait::async_trait;
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::PoseConfig;
use crate::error::PoseError;

pub const UPRIGHT_THRESHOLD_DEG: f64 = 160.0;
pub const UPRIGHT_MESSAGE: &str = "✅ You appear to be standing upright.";
pub const ADJUST_MESSAGE: &str = "⚠️ Try to straighten your back more.";
pub const NO_PERSON_MESSAGE: &str = "No person detected in the image.";

pub const LEFT_SHOULDER: usize = 11;
pub const LEFT_HIP: usize = 23;
pub const LEFT_KNEE: usize = 25;

/// Skeleton edges between landmark indices.
const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1), (1, 2), (2, 3), (3, 7), (0, 4), (4, 5), (5, 6), (6, 8), (9, 10),
    (11, 12), (11, 13), (13, 15), (15, 17), (15, 19), (15, 21), (17, 19),
    (12, 14), (14, 16), (16, 18), (16, 20), (16, 22), (18, 20),
    (11, 23), (12, 24), (23, 24), (23, 25), (24, 26), (25, 27), (26, 28),
    (27, 29), (28, 30), (29, 31), (30, 32), (27, 31), (28, 32),
];

const LANDMARK_COLOR: Rgb<u8> = Rgb([245, 66, 66]);
const CONNECTION_COLOR: Rgb<u8> = Rgb([66, 245, 96]);
const LANDMARK_RADIUS: i64 = 3;

/// A body landmark in normalized image coordinates (`0.0..=1.0`).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub visibility: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            visibility: None,
        }
    }
}

#[async_trait]
pub trait PoseEstimator: Send + Sync {
    /// Landmarks for the single person in the image, or `None` when nobody
    /// is detected.
    async fn estimate(&self, image_bytes: &[u8]) -> Result<Option<Vec<Landmark>>, PoseError>;
}

pub struct DisabledPoseEstimator;

#[async_trait]
impl PoseEstimator for DisabledPoseEstimator {
    async fn estimate(&self, _image_bytes: &[u8]) -> Result<Option<Vec<Landmark>>, PoseError> {
        Err(PoseError::Estimator("pose estimation is disabled".to_string()))
    }
}

/// Posts `{"image": <base64>}` and reads `{"landmarks": [{x, y, visibility}, ...]}`.
pub struct HttpPoseEstimator {
    client: reqwest::Client,
    url: String,
}

impl HttpPoseEstimator {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[derive(Deserialize)]
struct LandmarkResponse {
    #[serde(default)]
    landmarks: Vec<Landmark>,
}

#[async_trait]
impl PoseEstimator for HttpPoseEstimator {
    async fn estimate(&self, image_bytes: &[u8]) -> Result<Option<Vec<Landmark>>, PoseError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "image": encoded }))
            .send()
            .await
            .map_err(|e| PoseError::Estimator(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PoseError::Estimator(format!("{}: {}", status, body)));
        }

        let parsed: LandmarkResponse = response
            .json()
            .await
            .map_err(|e| PoseError::Estimator(e.to_string()))?;
        if parsed.landmarks.is_empty() {
            Ok(None)
        } else {
            Ok(Some(parsed.landmarks))
        }
    }
}

/// Builds the estimator selected by `[pose] provider`.
pub fn create_estimator(config: &PoseConfig) -> anyhow::Result<std::sync::Arc<dyn PoseEstimator>> {
    match config.provider.as_str() {
        "disabled" => Ok(std::sync::Arc::new(DisabledPoseEstimator)),
        "http" => {
            let url = config
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("pose.url required for http provider"))?;
            Ok(std::sync::Arc::new(HttpPoseEstimator::new(url, config.timeout_secs)?))
        }
        other => anyhow::bail!("Unknown pose provider: {}", other),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PoseReport {
    Assessed {
        message: String,
        image_path: String,
        angle: f64,
    },
    NoPerson,
}

impl PoseReport {
    pub fn message(&self) -> &str {
        match self {
            PoseReport::Assessed { message, .. } => message,
            PoseReport::NoPerson => NO_PERSON_MESSAGE,
        }
    }
}

pub struct PoseChecker {
    estimator: std::sync::Arc<dyn PoseEstimator>,
    static_dir: PathBuf,
}

impl PoseChecker {
    pub fn new(estimator: std::sync::Arc<dyn PoseEstimator>, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            estimator,
            static_dir: static_dir.into(),
        }
    }

    pub async fn check(&self, image_bytes: &[u8]) -> Result<PoseReport, PoseError> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|_| PoseError::InvalidImage)?
            .to_rgb8();

        let landmarks = match self.estimator.estimate(image_bytes).await? {
            Some(landmarks) => landmarks,
            None => return Ok(PoseReport::NoPerson),
        };
        if landmarks.len() <= LEFT_KNEE {
            return Err(PoseError::Estimator(format!(
                "expected at least {} landmarks, got {}",
                LEFT_KNEE + 1,
                landmarks.len()
            )));
        }

        let angle = joint_angle(
            landmarks[LEFT_SHOULDER],
            landmarks[LEFT_HIP],
            landmarks[LEFT_KNEE],
        );
        let message = classify(angle).to_string();
        tracing::info!(angle, "pose assessed");

        let file_name = format!("pose_{}.jpg", uuid::Uuid::new_v4().simple());
        let out_path = self.static_dir.join(&file_name);
        tokio::task::spawn_blocking(move || {
            let mut overlay = image;
            draw_skeleton(&mut overlay, &landmarks);
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PoseError::Save(e.to_string()))?;
            }
            overlay
                .save_with_format(&out_path, ImageFormat::Jpeg)
                .map_err(|e| PoseError::Save(e.to_string()))
        })
        .await
        .map_err(|e| PoseError::Save(e.to_string()))??;

        Ok(PoseReport::Assessed {
            message,
            image_path: format!("/static/{}", file_name),
            angle,
        })
    }
}

/// `fitrag pose <image>`: checks a local image file and prints the verdict.
pub async fn run_pose(config: &crate::config::Config, path: &std::path::Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let checker = PoseChecker::new(create_estimator(&config.pose)?, &config.server.static_dir);

    match checker.check(&bytes).await? {
        PoseReport::Assessed {
            message,
            image_path,
            angle,
        } => {
            println!("{}", message);
            println!("  hip angle: {:.1}°", angle);
            let file_name = image_path.trim_start_matches("/static/");
            println!("  overlay: {}", config.server.static_dir.join(file_name).display());
        }
        PoseReport::NoPerson => println!("{}", NO_PERSON_MESSAGE),
    }
    Ok(())
}

/// Angle at `b` between `a` and `c`, in degrees.
pub fn joint_angle(a: Landmark, b: Landmark, c: Landmark) -> f64 {
    let ba = (a.x - b.x, a.y - b.y);
    let bc = (c.x - b.x, c.y - b.y);
    let dot = ba.0 * bc.0 + ba.1 * bc.1;
    let norms = (ba.0 * ba.0 + ba.1 * ba.1).sqrt() * (bc.0 * bc.0 + bc.1 * bc.1).sqrt();
    let cosine = dot / (norms + 1e-6);
    cosine.clamp(-1.0, 1.0).acos().to_degrees()
}

pub fn classify(angle: f64) -> &'static str {
    if angle > UPRIGHT_THRESHOLD_DEG {
        UPRIGHT_MESSAGE
    } else {
        ADJUST_MESSAGE
    }
}

/// Normalized coordinates are clamped to one frame beyond each edge so a
/// wild landmark cannot stretch a line across billions of pixels.
fn to_pixel(lm: &Landmark, width: u32, height: u32) -> (i64, i64) {
    let x = lm.x.clamp(-1.0, 2.0);
    let y = lm.y.clamp(-1.0, 2.0);
    (
        (x * width as f64).round() as i64,
        (y * height as f64).round() as i64,
    )
}

pub fn draw_skeleton(image: &mut RgbImage, landmarks: &[Landmark]) {
    let (width, height) = image.dimensions();

    for &(from, to) in CONNECTIONS {
        if let (Some(a), Some(b)) = (landmarks.get(from), landmarks.get(to)) {
            draw_line(
                image,
                to_pixel(a, width, height),
                to_pixel(b, width, height),
                CONNECTION_COLOR,
            );
        }
    }

    for lm in landmarks {
        let (cx, cy) = to_pixel(lm, width, height);
        for dy in -LANDMARK_RADIUS..=LANDMARK_RADIUS {
            for dx in -LANDMARK_RADIUS..=LANDMARK_RADIUS {
                if dx * dx + dy * dy <= LANDMARK_RADIUS * LANDMARK_RADIUS {
                    put_pixel(image, cx + dx, cy + dy, LANDMARK_COLOR);
                }
            }
        }
    }
}

// Bresenham
fn draw_line(image: &mut RgbImage, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        put_pixel(image, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn put_pixel(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FixedEstimator(Option<Vec<Landmark>>);

    #[async_trait]
    impl PoseEstimator for FixedEstimator {
        async fn estimate(&self, _image_bytes: &[u8]) -> Result<Option<Vec<Landmark>>, PoseError> {
            Ok(self.0.clone())
        }
    }

    fn standing() -> Vec<Landmark> {
        let mut lms = vec![Landmark::new(0.5, 0.5); 33];
        lms[LEFT_SHOULDER] = Landmark::new(0.5, 0.2);
        lms[LEFT_HIP] = Landmark::new(0.5, 0.5);
        lms[LEFT_KNEE] = Landmark::new(0.5, 0.8);
        lms
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(40, 40, Rgb([10, 10, 10]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_joint_angle() {
        let straight = joint_angle(
            Landmark::new(0.0, 0.0),
            Landmark::new(0.0, 1.0),
            Landmark::new(0.0, 2.0),
        );
        assert!((straight - 180.0).abs() < 0.01);

        let right = joint_angle(
            Landmark::new(0.0, 1.0),
            Landmark::new(0.0, 0.0),
            Landmark::new(1.0, 0.0),
        );
        assert!((right - 90.0).abs() < 0.01);

        // degenerate vectors stay finite
        let p = Landmark::new(0.3, 0.3);
        assert!(joint_angle(p, p, p).is_finite());
    }

    #[test]
    fn test_classify_threshold() {
        assert_eq!(classify(175.0), UPRIGHT_MESSAGE);
        assert_eq!(classify(160.0), ADJUST_MESSAGE);
        assert_eq!(classify(120.0), ADJUST_MESSAGE);
    }

    #[tokio::test]
    async fn test_check_upright_saves_overlay() {
        let tmp = tempfile::TempDir::new().unwrap();
        let checker = PoseChecker::new(Arc::new(FixedEstimator(Some(standing()))), tmp.path());
        let report = checker.check(&png_bytes()).await.unwrap();
        match report {
            PoseReport::Assessed {
                message,
                image_path,
                angle,
            } => {
                assert_eq!(message, UPRIGHT_MESSAGE);
                assert!(angle > 179.0);
                let name = image_path.strip_prefix("/static/").unwrap();
                assert!(name.starts_with("pose_") && name.ends_with(".jpg"));
                assert!(tmp.path().join(name).exists());
            }
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_bent_over() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut lms = standing();
        lms[LEFT_SHOULDER] = Landmark::new(0.8, 0.5);
        let checker = PoseChecker::new(Arc::new(FixedEstimator(Some(lms))), tmp.path());
        let report = checker.check(&png_bytes()).await.unwrap();
        assert_eq!(report.message(), ADJUST_MESSAGE);
    }

    #[tokio::test]
    async fn test_no_person() {
        let tmp = tempfile::TempDir::new().unwrap();
        let checker = PoseChecker::new(Arc::new(FixedEstimator(None)), tmp.path());
        let report = checker.check(&png_bytes()).await.unwrap();
        assert_eq!(report, PoseReport::NoPerson);
        assert_eq!(report.message(), "No person detected in the image.");
    }

    #[tokio::test]
    async fn test_invalid_image() {
        let tmp = tempfile::TempDir::new().unwrap();
        let checker = PoseChecker::new(Arc::new(FixedEstimator(Some(standing()))), tmp.path());
        let err = checker.check(b"definitely not an image").await.unwrap_err();
        assert!(matches!(err, PoseError::InvalidImage));
    }

    #[test]
    fn test_draw_skeleton_clips_out_of_frame() {
        let mut img = RgbImage::new(20, 20);
        let mut lms = standing();
        lms[0] = Landmark::new(-0.5, 1.7);
        draw_skeleton(&mut img, &lms);
        assert_eq!(*img.get_pixel(10, 10), LANDMARK_COLOR);
    }

    #[test]
    fn test_draw_skeleton_bounds_extreme_coordinates() {
        let mut img = RgbImage::new(20, 20);
        let mut lms = standing();
        lms[11] = Landmark::new(1e12, -1e12);
        lms[12] = Landmark::new(f64::MAX, f64::MIN);
        lms[13] = Landmark::new(f64::NAN, f64::INFINITY);
        draw_skeleton(&mut img, &lms);
        assert_eq!(to_pixel(&lms[11], 20, 20), (40, -20));
        assert_eq!(to_pixel(&lms[12], 20, 20), (40, -20));
    }
}
