use serde::{Deserialize, Serialize};

use crate::core::error::{ApiError, ApiResult};

// --- Auth ---

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
    pub token: String,
    pub expires_at: String,
    pub user: UserDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub is_approved: Option<bool>,
    pub status: Option<String>,
}

impl UserDto {
    pub fn display_name(&self) -> &str {
        match self.nickname.as_deref() {
            Some(nick) if !nick.trim().is_empty() => nick,
            _ => &self.username,
        }
    }
}

// --- Projects ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Created,
    Active,
    InProgress,
    Completed,
    Archived,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Created => "created",
            ProjectStatus::Active => "active",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
            ProjectStatus::Unknown => "unknown",
        }
    }

    /// Statuses the home screen counts as writing in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, ProjectStatus::Active | ProjectStatus::InProgress)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMetadata {
    pub word_count: Option<i64>,
    pub chapter_count: Option<i64>,
    pub character_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDto {
    pub project_id: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub status: ProjectStatus,
    pub is_favorite: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub story_core: Option<String>,
    pub leading_brief: Option<String>,
    /// Older payloads spell this `firstIdea`.
    #[serde(alias = "firstIdea")]
    pub first_idea: Option<String>,
    pub brainstorm_ideas: Option<Vec<String>>,
    pub metadata: Option<ProjectMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub total: i64,
    pub total_pages: Option<i64>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectPage {
    #[serde(default)]
    pub projects: Vec<ProjectDto>,
    pub pagination: Option<Pagination>,
    pub total: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateProjectRequest {
    pub project_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_idea: Option<String>,
}

/// Partial update for PUT /projects/{id}; unset fields stay off the wire.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_core: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_idea: Option<String>,
}

impl ProjectPatch {
    pub fn favorite(value: bool) -> Self {
        Self {
            is_favorite: Some(value),
            ..Self::default()
        }
    }
}

/// Query knobs for the project list, preloaded with the backend defaults.
#[derive(Debug, Clone)]
pub struct ProjectQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub status: Option<ProjectStatus>,
    pub sort_by: String,
    pub sort_order: String,
}

impl Default for ProjectQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            search: None,
            status: None,
            sort_by: "updated_at".to_string(),
            sort_order: "desc".to_string(),
        }
    }
}

impl ProjectQuery {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
            ("sort_by", self.sort_by.clone()),
            ("sort_order", self.sort_order.clone()),
        ];
        if let Some(status) = &self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(search) = self.search.as_deref() {
            if !search.trim().is_empty() {
                pairs.push(("search", search.to_string()));
            }
        }
        pairs
    }
}

/// What the home screen summarizes out of one page of projects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HomeStats {
    pub total: i64,
    pub active: i64,
    pub completed: i64,
    pub words: i64,
}

impl HomeStats {
    pub fn from_page(page: &ProjectPage) -> Self {
        let projects = &page.projects;
        HomeStats {
            total: page.total.unwrap_or(projects.len() as i64),
            active: projects.iter().filter(|p| p.status.is_active()).count() as i64,
            completed: projects
                .iter()
                .filter(|p| p.status == ProjectStatus::Completed)
                .count() as i64,
            words: projects
                .iter()
                .filter_map(|p| p.metadata.as_ref().and_then(|m| m.word_count))
                .sum(),
        }
    }
}

// --- Creation workflow payloads ---

#[derive(Debug, Clone, Serialize)]
pub struct BrainstormRequest {
    pub first_idea: String,
    pub num_ideas: u32,
    pub creative_style: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl BrainstormRequest {
    pub fn new(first_idea: impl Into<String>) -> Self {
        Self {
            first_idea: first_idea.into(),
            num_ideas: 5,
            creative_style: Vec::new(),
            concept_type: None,
            plot_type: None,
            project_id: None,
        }
    }

    pub fn for_project(mut self, project_id: &str) -> Self {
        if !project_id.trim().is_empty() {
            self.project_id = Some(project_id.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrainstormPayload {
    pub brainstorm_ideas: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryCoreAdvanceRequest {
    pub project_id: String,
    pub story_core: String,
    pub leading_quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtagonistRequest {
    pub project_id: String,
    pub leading_quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtagonistPayload {
    pub leading_brief: Option<String>,
}

/// Response of the generators that answer flat instead of enveloped: the
/// generated text sits in `content` at the top level.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub content: Option<String>,
    pub data: Option<GenerateData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateData {
    pub project_id: Option<String>,
    pub sequence: Option<String>,
}

impl GenerateResponse {
    /// Rejects an explicit `success: false`, surfacing the server message.
    pub fn checked(self, fallback: &str) -> ApiResult<GenerateResponse> {
        if self.success == Some(false) {
            return Err(ApiError::Api(
                self.message
                    .unwrap_or_else(|| fallback.to_string()),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotGenerateRequest {
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BeatGenerateRequest {
    pub project_id: String,
    pub sequence_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SequenceBeats {
    #[serde(default)]
    pub sequence_id: String,
    pub scene_beats: Option<Vec<SceneBeat>>,
}

/// One plot beat. The backend emits either a bare string or an object with
/// `title`/`scene` and `summary`/`content`; both arrive as the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "SceneBeatWire")]
pub struct SceneBeat {
    pub title: String,
    pub summary: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SceneBeatWire {
    Text(String),
    Entry {
        title: Option<String>,
        scene: Option<String>,
        summary: Option<String>,
        content: Option<String>,
    },
}

impl From<SceneBeatWire> for SceneBeat {
    fn from(wire: SceneBeatWire) -> Self {
        match wire {
            SceneBeatWire::Text(raw) => {
                let first_line = raw
                    .lines()
                    .next()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .unwrap_or("Scene")
                    .to_string();
                SceneBeat {
                    title: first_line,
                    summary: raw,
                }
            }
            SceneBeatWire::Entry {
                title,
                scene,
                summary,
                content,
            } => SceneBeat {
                title: title
                    .or(scene)
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| "Scene".to_string()),
                summary: summary.or(content).unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptGenerateRequest {
    pub template_name: String,
    pub variables: ScriptVariables,
    pub metadata: ScriptMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptVariables {
    pub project_id: String,
    pub current_seq_beats: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptMetadata {
    pub project_id: String,
}

impl ScriptGenerateRequest {
    pub fn new(project_id: &str, beats: Vec<String>) -> Self {
        Self {
            template_name: "sequence_scripts".to_string(),
            variables: ScriptVariables {
                project_id: project_id.to_string(),
                current_seq_beats: beats,
            },
            metadata: ScriptMetadata {
                project_id: project_id.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptPayload {
    pub generated_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupportingCharacter {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub relationship: Option<String>,
    pub order_index: Option<i32>,
}

impl SupportingCharacter {
    /// One-line rendering for lists and previews.
    pub fn display_line(&self) -> String {
        let mut line = format!("{} - {}", self.name, self.description);
        if let Some(relationship) = self.relationship.as_deref() {
            if !relationship.trim().is_empty() {
                line.push(' ');
                line.push_str(relationship);
            }
        }
        line
    }
}

/// The supporting-character generator hands back its result as JSON text
/// inside `content`. Parse it as an array of records; loose prose degrades
/// to one name-only record per non-blank line.
pub fn parse_supporting_characters(content: &str) -> Vec<SupportingCharacter> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<SupportingCharacter>>(trimmed) {
        Ok(characters) => characters,
        Err(_) => trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| SupportingCharacter {
                id: None,
                name: line.to_string(),
                description: String::new(),
                relationship: None,
                order_index: None,
            })
            .collect(),
    }
}

// --- Narrative lab ---

#[derive(Debug, Clone, Serialize)]
pub struct BranchInput {
    pub branch_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiNarrativeRequest {
    pub project_id: String,
    pub theme: String,
    pub branches: Vec<BranchInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoryBranch {
    pub branch_title: String,
    pub synopsis: String,
    pub beat_outline: Option<Vec<String>>,
    pub hook: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TokenUsageDto {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MultiNarrativePayload {
    #[serde(default)]
    pub branches: Vec<StoryBranch>,
    pub token_usage: Option<TokenUsageDto>,
}

// --- Memory compass & media ---

#[derive(Debug, Clone, Serialize)]
pub struct MemoryCompassRequest {
    pub project_id: String,
    pub focus: String,
    pub anchors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompassNode {
    pub title: String,
    pub summary: String,
    pub relation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompassPayload {
    #[serde(default)]
    pub nodes: Vec<CompassNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaGenerateRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaAsset {
    pub url: Option<String>,
    pub preview: Option<String>,
    pub request_id: Option<String>,
}

// --- Points & payments ---

#[derive(Debug, Clone, Deserialize)]
pub struct PointsBalance {
    pub user_id: String,
    pub total_points: i64,
    pub usable_points: i64,
    pub frozen_points: i64,
    pub lifetime_earned: i64,
    pub lifetime_spent: i64,
    pub level: i32,
    pub level_name: String,
    pub next_level_points: i64,
    pub level_progress: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointsTransaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: i64,
    pub reason: String,
    pub status: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionHistory {
    #[serde(default)]
    pub transactions: Vec<PointsTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPrice {
    pub amount_formatted: String,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPlan {
    pub plan_id: String,
    pub name: String,
    pub tier: String,
    pub tier_label: String,
    pub description: String,
    pub duration_days: i32,
    pub points_bonus: i64,
    pub price: PaymentPrice,
    pub badge: Option<String>,
    #[serde(default)]
    pub popular: bool,
    pub features: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPointsTier {
    pub tier: String,
    pub tier_label: String,
    pub points: i64,
    pub price_label: String,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentPlanList {
    #[serde(default)]
    pub plans: Vec<PaymentPlan>,
    #[serde(default)]
    pub points_tiers: Vec<PaymentPointsTier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentOrderView {
    pub order_no: String,
    pub plan_name: String,
    pub plan_tier: String,
    pub channel: String,
    pub status: String,
    pub points_bonus: i64,
    pub amount: PaymentPrice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlipayPageCredential {
    pub page_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WechatNativeCredential {
    pub code_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCredential {
    pub channel: String,
    pub display: String,
    pub alipay_page: Option<AlipayPageCredential>,
    pub wechat_native: Option<WechatNativeCredential>,
}

impl PaymentCredential {
    /// Whatever the user must open or scan for this channel.
    pub fn target_url(&self) -> Option<&str> {
        self.alipay_page
            .as_ref()
            .map(|p| p.page_url.as_str())
            .or_else(|| self.wechat_native.as_ref().map(|w| w.code_url.as_str()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentOrder {
    pub order: PaymentOrderView,
    pub credential: PaymentCredential,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub plan_id: String,
    pub channel: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointsOrderRequest {
    pub points_tier: String,
    pub channel: String,
}
