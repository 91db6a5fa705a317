//! Multi-level oriented anchor generation.

use crate::{common::*, ratio::Ratio};

/// The anchor generator initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorGeneratorInit {
    /// The stride of each feature level in pixels.
    pub strides: Vec<usize>,
    /// Anchor aspect ratios, `h / w`.
    pub ratios: Vec<R64>,
    pub octave_base_scale: R64,
    pub scales_per_octave: usize,
    /// Anchor angles in radians.
    #[serde(default = "default_angles")]
    pub angles: Vec<R64>,
    /// The offset of anchor centers within a cell, in units of the stride.
    #[serde(default)]
    pub center_offset: Ratio,
    #[serde(default)]
    pub angle_range: AngleRange,
}

impl AnchorGeneratorInit {
    pub fn build(self) -> Result<AnchorGenerator> {
        let Self {
            strides,
            ratios,
            octave_base_scale,
            scales_per_octave,
            angles,
            center_offset,
            angle_range,
        } = self;

        ensure!(!strides.is_empty(), "at least one stride is required");
        ensure!(
            strides.iter().all(|&stride| stride > 0),
            "strides must be positive"
        );
        ensure!(!ratios.is_empty(), "at least one ratio is required");
        ensure!(
            ratios.iter().all(|&ratio| ratio > 0.0),
            "ratios must be positive"
        );
        ensure!(octave_base_scale > 0.0, "octave_base_scale must be positive");
        ensure!(scales_per_octave > 0, "scales_per_octave must be positive");
        ensure!(!angles.is_empty(), "at least one angle is required");

        let scales: Vec<f64> = (0..scales_per_octave)
            .map(|index| {
                octave_base_scale.raw() * 2f64.powf(index as f64 / scales_per_octave as f64)
            })
            .collect();

        // ratio-major, then scale, then angle
        let base_shapes: Vec<[f64; 3]> = ratios
            .iter()
            .flat_map(|ratio| {
                let angles = &angles;
                let sqrt_ratio = ratio.raw().sqrt();
                scales.iter().flat_map(move |&scale| {
                    angles
                        .iter()
                        .map(move |angle| [scale / sqrt_ratio, scale * sqrt_ratio, angle.raw()])
                })
            })
            .collect();

        Ok(AnchorGenerator {
            strides,
            base_shapes,
            center_offset: center_offset.to_f64(),
            angle_range,
        })
    }
}

fn default_angles() -> Vec<R64> {
    vec![r64(0.0)]
}

/// Generates anchors on the feature map grid of each level.
#[derive(Debug, Clone, Getters)]
pub struct AnchorGenerator {
    #[getset(get = "pub")]
    strides: Vec<usize>,
    /// `[w, h, angle]` in units of the stride.
    base_shapes: Vec<[f64; 3]>,
    center_offset: f64,
    angle_range: AngleRange,
}

impl AnchorGenerator {
    pub fn num_levels(&self) -> usize {
        self.strides.len()
    }

    /// The number of anchors per feature map cell.
    pub fn num_base_anchors(&self) -> usize {
        self.base_shapes.len()
    }

    /// The feature map size of each level for an image size.
    pub fn featmap_sizes(&self, image_size: &HW<usize>) -> Vec<HW<usize>> {
        self.strides
            .iter()
            .map(|&stride| image_size.div_ceil(stride))
            .collect()
    }

    /// Generate anchors for an image size.
    pub fn anchors_for_image(&self, image_size: &HW<usize>) -> AnchorSet {
        let featmap_sizes = self.featmap_sizes(image_size);
        self.generate(&featmap_sizes)
    }

    /// Generate anchors on the given feature map sizes, one per level.
    pub fn grid_anchors(&self, featmap_sizes: &[HW<usize>]) -> Result<AnchorSet> {
        ensure!(
            featmap_sizes.len() == self.num_levels(),
            "expect {} feature map sizes, but get {}",
            self.num_levels(),
            featmap_sizes.len()
        );
        Ok(self.generate(featmap_sizes))
    }

    fn generate(&self, featmap_sizes: &[HW<usize>]) -> AnchorSet {
        let mut anchors = vec![];
        let mut level_ranges = vec![];

        izip!(&self.strides, featmap_sizes).for_each(|(&stride, size)| {
            let begin = anchors.len();
            let stride = stride as f64;

            for row in 0..size.h() {
                for col in 0..size.w() {
                    let cx = (col as f64 + self.center_offset) * stride;
                    let cy = (row as f64 + self.center_offset) * stride;

                    anchors.extend(self.base_shapes.iter().map(|&[w, h, angle]| {
                        OBox_ {
                            cx: cx as f32,
                            cy: cy as f32,
                            w: (w * stride) as f32,
                            h: (h * stride) as f32,
                            angle: angle as f32,
                        }
                        .regularize(self.angle_range)
                    }));
                }
            }

            level_ranges.push(begin..anchors.len());
        });

        debug!(
            "generated {} anchors over {} levels",
            anchors.len(),
            level_ranges.len()
        );

        AnchorSet {
            anchors: anchors.into(),
            level_ranges,
        }
    }
}

/// An immutable, shared set of anchors ordered by level.
#[derive(Debug, Clone)]
pub struct AnchorSet {
    anchors: Arc<[OBox<f32>]>,
    level_ranges: Vec<Range<usize>>,
}

impl AnchorSet {
    pub fn anchors(&self) -> &[OBox<f32>] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn num_levels(&self) -> usize {
        self.level_ranges.len()
    }

    /// The anchor index range of each level.
    pub fn level_ranges(&self) -> &[Range<usize>] {
        &self.level_ranges
    }

    pub fn level(&self, index: usize) -> Option<&[OBox<f32>]> {
        let range = self.level_ranges.get(index)?.clone();
        Some(&self.anchors[range])
    }
}

impl From<Vec<OBox<f32>>> for AnchorSet {
    fn from(anchors: Vec<OBox<f32>>) -> Self {
        let len = anchors.len();
        Self {
            anchors: anchors.into(),
            level_ranges: vec![0..len],
        }
    }
}
