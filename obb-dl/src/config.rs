//! Detector configuration files.

use crate::{
    anchor::AnchorGeneratorInit,
    assigner::AssignerConfig,
    coder::DeltaXYWHTCoderInit,
    common::*,
    inference::PostProcessorInit,
    nms::{MultiClassNmsInit, NmsInit},
    overlap::EngineKind,
    ratio::Ratio,
    sampler::SamplerConfig,
    target::AnchorTargetInit,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub anchor: AnchorGeneratorInit,
    #[serde(default)]
    pub coder: DeltaXYWHTCoderInit,
    #[serde(default)]
    pub engine: EngineKind,
    pub train: TrainConfig,
    pub test: TestConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file '{}'", path.display()))?;
        let config = json5::from_str(&text)
            .with_context(|| format!("unable to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    pub fn anchor_target_init(&self) -> AnchorTargetInit {
        let TrainConfig {
            assigner,
            sampler,
            allowed_border,
            pos_weight,
        } = self.train.clone();

        AnchorTargetInit {
            assigner,
            sampler,
            coder: self.coder.clone(),
            allowed_border,
            pos_weight,
        }
    }

    pub fn post_processor_init(&self) -> PostProcessorInit {
        let TestConfig {
            nms_pre,
            min_bbox_size,
            score_thr,
            nms,
            max_per_img,
        } = self.test.clone();

        PostProcessorInit {
            coder: self.coder.clone(),
            nms_pre,
            nms: MultiClassNmsInit {
                score_thr,
                min_bbox_size,
                nms,
                max_per_img,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub assigner: AssignerConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub allowed_border: Option<R64>,
    #[serde(default)]
    pub pos_weight: Option<R64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub nms_pre: Option<usize>,
    #[serde(default = "default_min_bbox_size")]
    pub min_bbox_size: R64,
    pub score_thr: Ratio,
    pub nms: NmsInit,
    #[serde(default)]
    pub max_per_img: Option<usize>,
}

fn default_min_bbox_size() -> R64 {
    r64(0.0)
}
