use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Metadata captured alongside every frame. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Wall-clock time the frame was read from its source
    pub timestamp: DateTime<Utc>,
    /// Sequence number, starting at 1 after each open or loop restart
    pub sequence: u64,
    /// Identifier of the producing source
    pub source_id: String,
    /// Frame resolution (width, height)
    pub resolution: (u32, u32),
    /// Frames read so far divided by elapsed time since open
    pub fps: f64,
}

/// An owned RGB image paired with its metadata.
///
/// Moves from the capture worker into a frame channel; whoever pops it becomes
/// the sole owner.
#[derive(Debug, Clone)]
pub struct BufferedFrame {
    pub image: RgbImage,
    pub metadata: FrameMetadata,
}

impl BufferedFrame {
    pub fn new(image: RgbImage, metadata: FrameMetadata) -> Self {
        Self { image, metadata }
    }

    pub fn sequence(&self) -> u64 {
        self.metadata.sequence
    }

    pub fn source_id(&self) -> &str {
        &self.metadata.source_id
    }

    /// Shape as (height, width)
    pub fn shape(&self) -> (u32, u32) {
        (self.image.height(), self.image.width())
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.metadata.timestamp)
            .num_milliseconds()
            .max(0)
    }

    pub fn into_parts(self) -> (RgbImage, FrameMetadata) {
        (self.image, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_frame(sequence: u64) -> BufferedFrame {
        BufferedFrame::new(
            RgbImage::new(64, 48),
            FrameMetadata {
                timestamp: Utc::now(),
                sequence,
                source_id: "cam_gate".to_string(),
                resolution: (64, 48),
                fps: 25.0,
            },
        )
    }

    #[test]
    fn test_frame_shape_is_height_first() {
        let frame = create_test_frame(1);
        assert_eq!(frame.shape(), (48, 64));
        assert_eq!(frame.metadata.resolution, (64, 48));
        assert_eq!(frame.source_id(), "cam_gate");
    }

    #[test]
    fn test_metadata_serializes() {
        let frame = create_test_frame(7);
        let json = serde_json::to_value(&frame.metadata).unwrap();
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["source_id"], "cam_gate");
        assert_eq!(json["resolution"][0], 64);
    }

    #[test]
    fn test_into_parts() {
        let frame = create_test_frame(3);
        assert!(frame.age_ms() >= 0);
        let (image, metadata) = frame.into_parts();
        assert_eq!(image.width(), 64);
        assert_eq!(metadata.sequence, 3);
    }
}
