use std::sync::Arc;

use log::debug;

use crate::core::error::{ApiError, ApiResult};
use crate::core::models::{CompassNode, MediaAsset};
use crate::services::repository::NovelBackend;

pub const MAX_ANCHORS: usize = 8;
pub const MIN_VIDEO_SECONDS: u32 = 3;
pub const MAX_VIDEO_SECONDS: u32 = 60;
pub const DEFAULT_VIDEO_SECONDS: u32 = 10;

/// Holds the memory-compass screen: a focus, up to eight anchor keywords,
/// the node graph that came back, and the latest media assets.
pub struct CompassDesk {
    backend: Arc<dyn NovelBackend>,
    pub project_id: String,
    pub focus: String,
    anchors: Vec<String>,
    pub nodes: Vec<CompassNode>,
    pub image_asset: Option<MediaAsset>,
    pub video_asset: Option<MediaAsset>,
}

impl CompassDesk {
    pub fn new(backend: Arc<dyn NovelBackend>) -> Self {
        Self {
            backend,
            project_id: String::new(),
            focus: String::new(),
            anchors: Vec::new(),
            nodes: Vec::new(),
            image_asset: None,
            video_asset: None,
        }
    }

    pub fn anchors(&self) -> &[String] {
        &self.anchors
    }

    /// Blanks and duplicates are dropped silently; the list caps at eight.
    pub fn add_anchor(&mut self, value: &str) {
        let anchor = value.trim();
        if anchor.is_empty() || self.anchors.iter().any(|a| a == anchor) {
            return;
        }
        if self.anchors.len() >= MAX_ANCHORS {
            return;
        }
        self.anchors.push(anchor.to_string());
    }

    pub fn remove_anchor(&mut self, value: &str) {
        self.anchors.retain(|a| a != value);
    }

    pub async fn generate_compass(&mut self) -> ApiResult<()> {
        if self.focus.trim().is_empty() {
            return Err(ApiError::Validation("请先输入记忆焦点".to_string()));
        }
        let nodes = self
            .backend
            .generate_memory_compass(&self.project_id, self.focus.trim(), &self.anchors)
            .await?;
        debug!("Memory compass returned {} nodes", nodes.len());
        self.nodes = nodes;
        Ok(())
    }

    pub async fn generate_image(&mut self, prompt: &str, style: Option<&str>) -> ApiResult<()> {
        if prompt.trim().is_empty() {
            return Err(ApiError::Validation("请填写图片提示".to_string()));
        }
        // drop the stale asset so a failure never shows the previous image
        self.image_asset = None;
        self.image_asset = self.backend.generate_image(prompt.trim(), style).await?;
        Ok(())
    }

    /// Duration is clamped to the 3..=60s window the media service accepts.
    pub async fn generate_video(&mut self, prompt: &str, seconds: u32) -> ApiResult<()> {
        if prompt.trim().is_empty() {
            return Err(ApiError::Validation("请填写视频提示".to_string()));
        }
        let seconds = seconds.clamp(MIN_VIDEO_SECONDS, MAX_VIDEO_SECONDS);
        self.video_asset = None;
        self.video_asset = self.backend.generate_video(prompt.trim(), seconds).await?;
        Ok(())
    }
}
