//! Regression target encoding between anchors and oriented boxes.

use crate::common::*;
use bbox::angle_diff;

const SIZE_EPSILON: f64 = 1e-6;

/// The log-space bound of width and height deltas, `|ln(16 / 1000)|`.
pub const DEFAULT_WH_RATIO_CLIP: f64 = 4.135166556742356;

/// The coordinate frame of center offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaFrame {
    /// Offsets along the image axes.
    Image,
    /// Offsets along the anchor's rotated axes.
    Anchor,
}

impl Default for DeltaFrame {
    fn default() -> Self {
        Self::Image
    }
}

/// The delta coder initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaXYWHTCoderInit {
    #[serde(default = "default_means")]
    pub means: [R64; 5],
    #[serde(default = "default_stds")]
    pub stds: [R64; 5],
    /// The maximum magnitude of decoded log-space size deltas.
    #[serde(default = "default_wh_ratio_clip")]
    pub wh_ratio_clip: Option<R64>,
    #[serde(default)]
    pub angle_range: AngleRange,
    #[serde(default)]
    pub frame: DeltaFrame,
}

impl Default for DeltaXYWHTCoderInit {
    fn default() -> Self {
        Self {
            means: default_means(),
            stds: default_stds(),
            wh_ratio_clip: default_wh_ratio_clip(),
            angle_range: AngleRange::default(),
            frame: DeltaFrame::default(),
        }
    }
}

impl DeltaXYWHTCoderInit {
    pub fn build(self) -> Result<DeltaXYWHTCoder> {
        let Self {
            means,
            stds,
            wh_ratio_clip,
            angle_range,
            frame,
        } = self;

        ensure!(
            stds.iter().all(|&std| std > 0.0),
            "stds must be positive, but get {:?}",
            stds
        );
        if let Some(clip) = wh_ratio_clip {
            ensure!(clip >= 0.0, "wh_ratio_clip must be non-negative");
        }

        Ok(DeltaXYWHTCoder {
            means: means.map(|mean| mean.raw()),
            stds: stds.map(|std| std.raw()),
            wh_ratio_clip: wh_ratio_clip.map(|clip| clip.raw()),
            angle_range,
            frame,
        })
    }
}

/// Encoder and decoder of `(dx, dy, dw, dh, dθ)` regression deltas.
#[derive(Debug, Clone, PartialEq, CopyGetters)]
pub struct DeltaXYWHTCoder {
    #[getset(get_copy = "pub")]
    means: [f64; 5],
    #[getset(get_copy = "pub")]
    stds: [f64; 5],
    #[getset(get_copy = "pub")]
    wh_ratio_clip: Option<f64>,
    #[getset(get_copy = "pub")]
    angle_range: AngleRange,
    #[getset(get_copy = "pub")]
    frame: DeltaFrame,
}

impl DeltaXYWHTCoder {
    /// Encode the ground truth relative to the anchor.
    pub fn encode(&self, anchor: &OBox<f32>, gt: &OBox<f32>) -> [f32; 5] {
        let [acx, acy, aw, ah, aa] = anchor.cxcywha().map(|value| value as f64);
        let [gcx, gcy, gw, gh, ga] = gt.cxcywha().map(|value| value as f64);
        let aw = aw.max(SIZE_EPSILON);
        let ah = ah.max(SIZE_EPSILON);

        let (offset_x, offset_y) = (gcx - acx, gcy - acy);
        let (dx, dy) = match self.frame {
            DeltaFrame::Image => (offset_x / aw, offset_y / ah),
            DeltaFrame::Anchor => {
                let (sin, cos) = aa.sin_cos();
                (
                    (cos * offset_x + sin * offset_y) / aw,
                    (-sin * offset_x + cos * offset_y) / ah,
                )
            }
        };
        let dw = (gw.max(SIZE_EPSILON) / aw).ln();
        let dh = (gh.max(SIZE_EPSILON) / ah).ln();
        let da = angle_diff(ga, aa);

        let mut deltas = [0f32; 5];
        izip!(&mut deltas, [dx, dy, dw, dh, da], self.means, self.stds).for_each(
            |(output, delta, mean, std)| {
                *output = ((delta - mean) / std) as f32;
            },
        );
        deltas
    }

    /// Decode deltas relative to the anchor into a regularized box.
    pub fn decode(&self, anchor: &OBox<f32>, deltas: [f32; 5]) -> OBox<f32> {
        let [acx, acy, aw, ah, aa] = anchor.cxcywha().map(|value| value as f64);
        let aw = aw.max(SIZE_EPSILON);
        let ah = ah.max(SIZE_EPSILON);

        let mut denorm = [0f64; 5];
        izip!(&mut denorm, deltas, self.means, self.stds).for_each(
            |(output, delta, mean, std)| {
                *output = delta as f64 * std + mean;
            },
        );
        let [dx, dy, dw, dh, da] = denorm;

        let (dw, dh) = match self.wh_ratio_clip {
            Some(clip) => (dw.clamp(-clip, clip), dh.clamp(-clip, clip)),
            None => (dw, dh),
        };

        let (cx, cy) = match self.frame {
            DeltaFrame::Image => (acx + dx * aw, acy + dy * ah),
            DeltaFrame::Anchor => {
                let (sin, cos) = aa.sin_cos();
                (
                    acx + cos * dx * aw - sin * dy * ah,
                    acy + sin * dx * aw + cos * dy * ah,
                )
            }
        };

        OBox_ {
            cx: cx as f32,
            cy: cy as f32,
            w: (aw * dw.exp()) as f32,
            h: (ah * dh.exp()) as f32,
            angle: (aa + da) as f32,
        }
        .regularize(self.angle_range)
    }

    /// Encode pairs of anchors and ground truth boxes into a `[N, 5]` array.
    pub fn encode_batch(&self, anchors: &[OBox<f32>], gts: &[OBox<f32>]) -> Result<Array2<f32>> {
        ensure!(
            anchors.len() == gts.len(),
            "the number of anchors ({}) and ground truth boxes ({}) mismatch",
            anchors.len(),
            gts.len()
        );
        let values: Vec<f32> = anchors
            .iter()
            .zip(gts)
            .flat_map(|(anchor, gt)| self.encode(anchor, gt))
            .collect();
        Ok(Array2::from_shape_vec((anchors.len(), 5), values)?)
    }

    /// Decode a `[N, 5]` delta array relative to the anchors.
    pub fn decode_batch(
        &self,
        anchors: &[OBox<f32>],
        deltas: ArrayView2<'_, f32>,
    ) -> Result<Vec<OBox<f32>>> {
        ensure!(
            deltas.ncols() == 5,
            "deltas must have 5 columns, but get {}",
            deltas.ncols()
        );
        ensure!(
            anchors.len() == deltas.nrows(),
            "the number of anchors ({}) and deltas ({}) mismatch",
            anchors.len(),
            deltas.nrows()
        );
        let boxes = anchors
            .iter()
            .zip(deltas.outer_iter())
            .map(|(anchor, delta)| {
                let delta = [delta[0], delta[1], delta[2], delta[3], delta[4]];
                self.decode(anchor, delta)
            })
            .collect();
        Ok(boxes)
    }
}

fn default_means() -> [R64; 5] {
    [r64(0.0); 5]
}

fn default_stds() -> [R64; 5] {
    [r64(1.0); 5]
}

fn default_wh_ratio_clip() -> Option<R64> {
    Some(r64(DEFAULT_WH_RATIO_CLIP))
}
