use std::sync::Arc;
use std::time::SystemTime;

use log::debug;

use crate::core::error::{ApiError, ApiResult};
use crate::core::models::{BrainstormRequest, ProjectDto, SceneBeat, SupportingCharacter};
use crate::services::repository::NovelBackend;

/// Previews keep this many characters of the step result.
pub const PREVIEW_CHARS: usize = 120;

const DEFAULT_FIRST_IDEA: &str = "请生成一部都市奇幻爱情故事";
const PLACEHOLDER_BEAT: &str = "Scene 1: 引入";
const MAIN_SEQUENCE_ID: &str = "seq_main";

/// The six creation stages, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Inspiration,
    StoryCore,
    Protagonist,
    Relationships,
    Plot,
    Writing,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::Inspiration,
        StepKind::StoryCore,
        StepKind::Protagonist,
        StepKind::Relationships,
        StepKind::Plot,
        StepKind::Writing,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            StepKind::Inspiration => "输入灵感",
            StepKind::StoryCore => "故事核心",
            StepKind::Protagonist => "主角人物",
            StepKind::Relationships => "配角关系",
            StepKind::Plot => "情节序列",
            StepKind::Writing => "正文生成",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StepKind::Inspiration => "生成灵感与故事核心",
            StepKind::StoryCore => "深化故事设定",
            StepKind::Protagonist => "生成主角设定",
            StepKind::Relationships => "生成配角与关系",
            StepKind::Plot => "生成序列与节拍",
            StepKind::Writing => "根据节拍生成正文",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed(String),
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Idle => "待处理",
            StepStatus::Running => "生成中",
            StepStatus::Completed => "已完成",
            StepStatus::Failed(_) => "失败",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepState {
    pub kind: StepKind,
    pub status: StepStatus,
    pub preview: String,
    pub updated_at: Option<SystemTime>,
}

impl StepState {
    fn new(kind: StepKind) -> Self {
        Self {
            kind,
            status: StepStatus::Idle,
            preview: String::new(),
            updated_at: None,
        }
    }
}

/// Drives one project through the six creation stages.
///
/// Steps run in any order the user picks. A step that is already running
/// refuses a second trigger; a failed step can simply be run again. The
/// first step to run creates a working project when none is attached yet.
pub struct CreationTracker {
    backend: Arc<dyn NovelBackend>,
    default_project_name: String,
    steps: [StepState; 6],

    pub project_id: String,
    pub project_name: String,
    pub first_idea: String,
    pub brainstorm_ideas: Vec<String>,
    pub story_core: String,
    pub protagonist: String,
    pub supporting: Vec<SupportingCharacter>,
    pub plot_sequence: String,
    pub scene_beats: Vec<SceneBeat>,
    pub script: String,
}

impl CreationTracker {
    pub fn new(backend: Arc<dyn NovelBackend>, default_project_name: &str) -> Self {
        Self {
            backend,
            default_project_name: default_project_name.to_string(),
            steps: StepKind::ALL.map(StepState::new),
            project_id: String::new(),
            project_name: String::new(),
            first_idea: String::new(),
            brainstorm_ideas: Vec::new(),
            story_core: String::new(),
            protagonist: String::new(),
            supporting: Vec::new(),
            plot_sequence: String::new(),
            scene_beats: Vec::new(),
            script: String::new(),
        }
    }

    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn step(&self, kind: StepKind) -> &StepState {
        &self.steps[kind as usize]
    }

    /// Pulls an existing project's saved fields into the tracker so the
    /// stages continue from where the project left off.
    pub async fn attach_project(&mut self, project_id: &str) -> ApiResult<()> {
        if project_id.trim().is_empty() {
            return Err(ApiError::Validation("请输入项目ID".to_string()));
        }
        let project = self.backend.fetch_project(project_id).await?;
        self.apply_project(project);
        Ok(())
    }

    fn apply_project(&mut self, project: ProjectDto) {
        self.project_id = project.project_id;
        self.project_name = project.project_name;
        if let Some(idea) = project.first_idea {
            self.first_idea = idea;
        }
        if let Some(core) = project.story_core {
            self.story_core = core;
        }
        if let Some(brief) = project.leading_brief {
            self.protagonist = brief;
        }
        if let Some(ideas) = project.brainstorm_ideas {
            self.brainstorm_ideas = ideas;
        }
    }

    /// Runs one stage: marks it running, makes sure a project exists, calls
    /// the generator, and records completion or failure with a preview.
    pub async fn run_step(&mut self, kind: StepKind) -> ApiResult<()> {
        if self.step(kind).status == StepStatus::Running {
            return Err(ApiError::Validation(format!(
                "「{}」正在生成中",
                kind.title()
            )));
        }

        self.update_step(kind, StepStatus::Running, None);

        if let Err(err) = self.ensure_project().await {
            self.update_step(kind, StepStatus::Failed(err.to_string()), None);
            return Err(err);
        }

        let outcome = match kind {
            StepKind::Inspiration => self.run_inspiration().await,
            StepKind::StoryCore => self.run_story_core().await,
            StepKind::Protagonist => self.run_protagonist().await,
            StepKind::Relationships => self.run_relationships().await,
            StepKind::Plot => self.run_plot().await,
            StepKind::Writing => self.run_writing().await,
        };

        match outcome {
            Ok(()) => {
                let preview = self.preview_for(kind);
                self.update_step(kind, StepStatus::Completed, Some(preview));
                Ok(())
            }
            Err(err) => {
                self.update_step(kind, StepStatus::Failed(err.to_string()), None);
                Err(err)
            }
        }
    }

    /// Creates a working project on first use so every stage has one to
    /// target. An attached project id short-circuits.
    pub async fn ensure_project(&mut self) -> ApiResult<()> {
        if !self.project_id.trim().is_empty() {
            return Ok(());
        }
        let name = if self.project_name.trim().is_empty() {
            self.default_project_name.clone()
        } else {
            self.project_name.clone()
        };
        let idea = (!self.first_idea.trim().is_empty()).then(|| self.first_idea.clone());

        let project = self.backend.create_project(&name, idea.as_deref()).await?;
        debug!("Created working project {}", project.project_id);
        self.project_id = project.project_id;
        if !project.project_name.is_empty() {
            self.project_name = project.project_name;
        }
        Ok(())
    }

    async fn run_inspiration(&mut self) -> ApiResult<()> {
        let idea = if self.first_idea.trim().is_empty() {
            DEFAULT_FIRST_IDEA.to_string()
        } else {
            self.first_idea.clone()
        };
        let request = BrainstormRequest::new(idea).for_project(&self.project_id);
        let ideas = self.backend.generate_brainstorm(&request).await?;
        if let Some(first) = ideas.first() {
            self.story_core = first.clone();
        }
        self.brainstorm_ideas = ideas;

        // a fresh core is pushed to the server right away
        if !self.story_core.trim().is_empty() {
            self.backend
                .advance_story_core(&self.project_id, &self.story_core)
                .await?;
        }
        Ok(())
    }

    async fn run_story_core(&mut self) -> ApiResult<()> {
        if self.story_core.trim().is_empty() {
            if let Some(idea) = self.brainstorm_ideas.first() {
                self.story_core = idea.clone();
            }
        }
        if self.story_core.trim().is_empty() {
            return Err(ApiError::Validation("请先生成或选择灵感".to_string()));
        }
        self.backend
            .advance_story_core(&self.project_id, &self.story_core)
            .await
    }

    async fn run_protagonist(&mut self) -> ApiResult<()> {
        if let Some(brief) = self.backend.generate_protagonist(&self.project_id).await? {
            if !brief.trim().is_empty() {
                self.protagonist = brief;
            }
        }
        Ok(())
    }

    async fn run_relationships(&mut self) -> ApiResult<()> {
        self.supporting = self.backend.generate_supporting(&self.project_id).await?;
        Ok(())
    }

    async fn run_plot(&mut self) -> ApiResult<()> {
        if let Some(sequence) = self.backend.generate_plot(&self.project_id).await? {
            self.plot_sequence = sequence;
        }
        self.scene_beats = self
            .backend
            .generate_beats(&self.project_id, MAIN_SEQUENCE_ID)
            .await?;
        Ok(())
    }

    async fn run_writing(&mut self) -> ApiResult<()> {
        let beats: Vec<String> = if self.scene_beats.is_empty() {
            vec![PLACEHOLDER_BEAT.to_string()]
        } else {
            self.scene_beats.iter().map(|b| b.summary.clone()).collect()
        };
        self.script = self.backend.generate_script(&self.project_id, beats).await?;
        Ok(())
    }

    fn preview_for(&self, kind: StepKind) -> String {
        let raw = match kind {
            StepKind::Inspiration | StepKind::StoryCore => self.story_core.clone(),
            StepKind::Protagonist => self.protagonist.clone(),
            StepKind::Relationships => self
                .supporting
                .first()
                .map(SupportingCharacter::display_line)
                .unwrap_or_default(),
            StepKind::Plot => self
                .scene_beats
                .first()
                .map(|b| b.summary.clone())
                .unwrap_or_else(|| self.plot_sequence.clone()),
            StepKind::Writing => self.script.clone(),
        };
        truncate_preview(&raw, PREVIEW_CHARS)
    }

    fn update_step(&mut self, kind: StepKind, status: StepStatus, preview: Option<String>) {
        let step = &mut self.steps[kind as usize];
        step.status = status;
        if let Some(preview) = preview {
            step.preview = preview;
        }
        step.updated_at = Some(SystemTime::now());
    }
}

/// Character-safe truncation; previews must not split a multibyte char.
pub fn truncate_preview(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
