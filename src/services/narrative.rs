use std::sync::Arc;

use log::debug;

use crate::core::error::{ApiError, ApiResult};
use crate::core::models::{BranchInput, MultiNarrativeRequest, StoryBranch, TokenUsageDto};
use crate::services::repository::NovelBackend;
use crate::utils::tokens::{self, TokenUsageEstimate};

pub const MAX_BRANCHES: usize = 6;
pub const DEFAULT_TARGET_TOKENS: u32 = 512;

/// One editable branch row in the lab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchForm {
    pub title: String,
    pub goal: String,
    pub tone: String,
}

impl BranchForm {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    /// The text the estimator sees for this row.
    pub fn input_string(&self) -> String {
        format!("{} {} {}", self.title, self.goal, self.tone)
            .trim()
            .to_string()
    }
}

/// State for the multi-branch generation lab.
///
/// Every edit recomputes the local token estimate, so the number on screen
/// always reflects the current form. After a successful generation the
/// estimate is recomputed once more from the branches that actually came
/// back, next to the server-reported usage.
pub struct NarrativeLab {
    backend: Arc<dyn NovelBackend>,
    pub project_id: String,
    theme: String,
    target_tokens: u32,
    branches: Vec<BranchForm>,
    estimated: TokenUsageEstimate,
    remote_usage: Option<TokenUsageDto>,
    results: Vec<StoryBranch>,
    error: Option<String>,
}

impl NarrativeLab {
    pub fn new(backend: Arc<dyn NovelBackend>) -> Self {
        let mut lab = Self {
            backend,
            project_id: String::new(),
            theme: String::new(),
            target_tokens: DEFAULT_TARGET_TOKENS,
            branches: vec![BranchForm::titled("主线A"), BranchForm::titled("支线B")],
            estimated: TokenUsageEstimate::default(),
            remote_usage: None,
            results: Vec::new(),
            error: None,
        };
        lab.recalculate();
        lab
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn target_tokens(&self) -> u32 {
        self.target_tokens
    }

    pub fn branches(&self) -> &[BranchForm] {
        &self.branches
    }

    pub fn estimated(&self) -> TokenUsageEstimate {
        self.estimated
    }

    pub fn remote_usage(&self) -> Option<TokenUsageDto> {
        self.remote_usage
    }

    pub fn results(&self) -> &[StoryBranch] {
        &self.results
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_theme(&mut self, value: &str) {
        self.theme = value.to_string();
        self.recalculate();
    }

    /// Takes the raw text of the budget field. Unparsable input keeps the
    /// previous value; anything below one is floored to one.
    pub fn set_target_tokens(&mut self, input: &str) {
        if let Ok(parsed) = input.trim().parse::<i64>() {
            self.target_tokens = parsed.clamp(1, u32::MAX as i64) as u32;
        }
        self.recalculate();
    }

    pub fn set_branch_title(&mut self, index: usize, value: &str) {
        if let Some(branch) = self.branches.get_mut(index) {
            branch.title = value.to_string();
            self.recalculate();
        }
    }

    pub fn set_branch_goal(&mut self, index: usize, value: &str) {
        if let Some(branch) = self.branches.get_mut(index) {
            branch.goal = value.to_string();
            self.recalculate();
        }
    }

    pub fn set_branch_tone(&mut self, index: usize, value: &str) {
        if let Some(branch) = self.branches.get_mut(index) {
            branch.tone = value.to_string();
            self.recalculate();
        }
    }

    /// Adds an empty row titled 分支N, capped at six rows.
    pub fn add_branch(&mut self) {
        if self.branches.len() >= MAX_BRANCHES {
            return;
        }
        let title = format!("分支{}", self.branches.len() + 1);
        self.branches.push(BranchForm::titled(&title));
        self.recalculate();
    }

    /// Removes a row; the last remaining row stays.
    pub fn remove_branch(&mut self, index: usize) {
        if self.branches.len() <= 1 || index >= self.branches.len() {
            return;
        }
        self.branches.remove(index);
        self.recalculate();
    }

    pub async fn generate(&mut self) -> ApiResult<()> {
        let valid: Vec<BranchForm> = self
            .branches
            .iter()
            .filter(|b| !b.input_string().is_empty())
            .cloned()
            .collect();

        if self.theme.trim().is_empty() || valid.is_empty() {
            let message = "请先填写主题和至少一条分支".to_string();
            self.error = Some(message.clone());
            return Err(ApiError::Validation(message));
        }

        self.error = None;
        self.results.clear();
        self.remote_usage = None;
        let inputs: Vec<String> = valid.iter().map(BranchForm::input_string).collect();
        self.estimated = tokens::estimate_for_branches(&self.theme, &inputs, self.target_tokens);

        let request = MultiNarrativeRequest {
            project_id: self.project_id.clone(),
            theme: self.theme.clone(),
            branches: valid
                .iter()
                .map(|b| BranchInput {
                    branch_title: if b.title.trim().is_empty() {
                        "分支".to_string()
                    } else {
                        b.title.clone()
                    },
                    goal: some_if_not_blank(&b.goal),
                    tone: some_if_not_blank(&b.tone),
                })
                .collect(),
            max_tokens: Some(self.target_tokens),
        };

        match self.backend.generate_multi_narrative(&request).await {
            Ok(payload) => {
                self.results = payload.branches;
                self.remote_usage = payload.token_usage;
                // the post-run estimate reflects what actually came back,
                // not the form the user happened to leave behind
                let returned: Vec<String> =
                    self.results.iter().map(branch_result_string).collect();
                self.estimated =
                    tokens::estimate_for_branches(&self.theme, &returned, self.target_tokens);
                debug!("Narrative lab produced {} branches", self.results.len());
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn recalculate(&mut self) {
        let inputs: Vec<String> = self.branches.iter().map(BranchForm::input_string).collect();
        self.estimated = tokens::estimate_for_branches(&self.theme, &inputs, self.target_tokens);
    }
}

fn some_if_not_blank(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Text of a returned branch as the estimator should see it.
fn branch_result_string(branch: &StoryBranch) -> String {
    format!(
        "{} {} {}",
        branch.branch_title,
        branch.synopsis,
        branch.hook.as_deref().unwrap_or("")
    )
    .trim()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{
        CompassNode, MediaAsset, MultiNarrativePayload, ProjectDto, SceneBeat,
        SupportingCharacter,
    };
    use crate::services::repository::NovelBackend;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers only the multi-narrative call; captures the request it saw.
    struct ScriptedBackend {
        request_seen: Mutex<Option<MultiNarrativeRequest>>,
        response: Result<MultiNarrativePayload, String>,
    }

    impl ScriptedBackend {
        fn ok(payload: MultiNarrativePayload) -> Self {
            Self {
                request_seen: Mutex::new(None),
                response: Ok(payload),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                request_seen: Mutex::new(None),
                response: Err(message.to_string()),
            }
        }
    }

    #[async_trait]
    impl NovelBackend for ScriptedBackend {
        async fn create_project(
            &self,
            _name: &str,
            _idea: Option<&str>,
        ) -> ApiResult<ProjectDto> {
            Err(ApiError::Validation("unexpected call".to_string()))
        }

        async fn fetch_project(&self, _project_id: &str) -> ApiResult<ProjectDto> {
            Err(ApiError::Validation("unexpected call".to_string()))
        }

        async fn generate_brainstorm(
            &self,
            _request: &crate::core::models::BrainstormRequest,
        ) -> ApiResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn advance_story_core(&self, _project_id: &str, _core: &str) -> ApiResult<()> {
            Ok(())
        }

        async fn generate_protagonist(&self, _project_id: &str) -> ApiResult<Option<String>> {
            Ok(None)
        }

        async fn generate_supporting(
            &self,
            _project_id: &str,
        ) -> ApiResult<Vec<SupportingCharacter>> {
            Ok(Vec::new())
        }

        async fn generate_plot(&self, _project_id: &str) -> ApiResult<Option<String>> {
            Ok(None)
        }

        async fn generate_beats(
            &self,
            _project_id: &str,
            _sequence_id: &str,
        ) -> ApiResult<Vec<SceneBeat>> {
            Ok(Vec::new())
        }

        async fn generate_script(
            &self,
            _project_id: &str,
            _beats: Vec<String>,
        ) -> ApiResult<String> {
            Ok(String::new())
        }

        async fn generate_multi_narrative(
            &self,
            request: &MultiNarrativeRequest,
        ) -> ApiResult<MultiNarrativePayload> {
            *self.request_seen.lock().unwrap() = Some(request.clone());
            match &self.response {
                Ok(payload) => Ok(payload.clone()),
                Err(message) => Err(ApiError::Api(message.clone())),
            }
        }

        async fn generate_memory_compass(
            &self,
            _project_id: &str,
            _focus: &str,
            _anchors: &[String],
        ) -> ApiResult<Vec<CompassNode>> {
            Ok(Vec::new())
        }

        async fn generate_image(
            &self,
            _prompt: &str,
            _style: Option<&str>,
        ) -> ApiResult<Option<MediaAsset>> {
            Ok(None)
        }

        async fn generate_video(
            &self,
            _prompt: &str,
            _seconds: u32,
        ) -> ApiResult<Option<MediaAsset>> {
            Ok(None)
        }
    }

    fn branch(title: &str, synopsis: &str, hook: Option<&str>) -> StoryBranch {
        StoryBranch {
            branch_title: title.to_string(),
            synopsis: synopsis.to_string(),
            beat_outline: None,
            hook: hook.map(str::to_string),
        }
    }

    #[test]
    fn test_defaults_and_reactive_estimate() {
        let lab = NarrativeLab::new(Arc::new(ScriptedBackend::ok(Default::default())));
        assert_eq!(lab.branches().len(), 2);
        assert_eq!(lab.branches()[0].title, "主线A");
        assert_eq!(lab.branches()[1].title, "支线B");
        assert_eq!(lab.target_tokens(), DEFAULT_TARGET_TOKENS);
        assert_eq!(lab.estimated().completion_tokens, 512);

        let mut lab = lab;
        let before = lab.estimated().prompt_tokens;
        lab.set_theme("双城记：旧港与新城之间的灯火");
        assert!(
            lab.estimated().prompt_tokens > before,
            "theme edits must show up in the estimate immediately"
        );

        lab.set_branch_goal(0, "夺回家族酒馆并查明纵火真相");
        let with_goal = lab.estimated().prompt_tokens;
        lab.set_branch_goal(0, "");
        assert!(lab.estimated().prompt_tokens < with_goal);
    }

    #[test]
    fn test_branch_count_bounds() {
        let mut lab = NarrativeLab::new(Arc::new(ScriptedBackend::ok(Default::default())));

        lab.add_branch();
        assert_eq!(lab.branches()[2].title, "分支3");
        lab.add_branch();
        lab.add_branch();
        lab.add_branch();
        assert_eq!(lab.branches().len(), MAX_BRANCHES);
        lab.add_branch();
        assert_eq!(lab.branches().len(), MAX_BRANCHES, "seventh row is refused");

        for _ in 0..10 {
            lab.remove_branch(0);
        }
        assert_eq!(lab.branches().len(), 1, "the last row cannot be removed");
    }

    #[test]
    fn test_target_tokens_parsing() {
        let mut lab = NarrativeLab::new(Arc::new(ScriptedBackend::ok(Default::default())));

        lab.set_target_tokens("2048");
        assert_eq!(lab.target_tokens(), 2048);
        assert_eq!(lab.estimated().completion_tokens, 2048);

        lab.set_target_tokens("abc");
        assert_eq!(lab.target_tokens(), 2048, "garbage keeps the old value");

        lab.set_target_tokens("0");
        assert_eq!(lab.target_tokens(), 1, "floored at one");

        lab.set_target_tokens("-30");
        assert_eq!(lab.target_tokens(), 1);
    }

    #[test]
    fn test_maximal_target_budget_does_not_wrap_estimate() {
        let mut lab = NarrativeLab::new(Arc::new(ScriptedBackend::ok(Default::default())));

        lab.set_target_tokens("4294967295");
        assert_eq!(lab.target_tokens(), u32::MAX);
        let usage = lab.estimated();
        assert!(usage.prompt_tokens >= 1, "default branches count as prompt");
        assert_eq!(usage.total_tokens, u32::MAX, "total saturates at the cap");

        lab.set_target_tokens("9000000000");
        assert_eq!(lab.target_tokens(), u32::MAX, "budget clamps at the cap");
    }

    #[tokio::test]
    async fn test_generate_requires_theme_and_branch() {
        let backend = Arc::new(ScriptedBackend::ok(Default::default()));
        let mut lab = NarrativeLab::new(backend.clone());

        // default rows have titles, but the theme is still blank
        let err = lab.generate().await.unwrap_err();
        assert_eq!(err.to_string(), "请先填写主题和至少一条分支");
        assert_eq!(lab.error(), Some("请先填写主题和至少一条分支"));
        assert!(
            backend.request_seen.lock().unwrap().is_none(),
            "validation failures never reach the backend"
        );

        // a theme alone is not enough either
        lab.set_theme("主题");
        lab.set_branch_title(0, " ");
        lab.set_branch_title(1, "");
        let err = lab.generate().await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_generate_maps_form_to_request() {
        let backend = Arc::new(ScriptedBackend::ok(Default::default()));
        let mut lab = NarrativeLab::new(backend.clone());
        lab.project_id = "p9".to_string();
        lab.set_theme("双城记");
        lab.set_branch_goal(0, "夺回酒馆");
        lab.set_branch_title(1, "  ");
        lab.set_branch_tone(1, "冷峻");
        lab.set_target_tokens("800");

        lab.generate().await.unwrap();

        let request = backend.request_seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.project_id, "p9");
        assert_eq!(request.theme, "双城记");
        assert_eq!(request.max_tokens, Some(800));
        assert_eq!(request.branches.len(), 2);
        assert_eq!(request.branches[0].branch_title, "主线A");
        assert_eq!(request.branches[0].goal.as_deref(), Some("夺回酒馆"));
        assert_eq!(request.branches[0].tone, None, "blank fields become None");
        assert_eq!(
            request.branches[1].branch_title, "分支",
            "a row kept alive by its tone still gets a title"
        );
        assert_eq!(request.branches[1].tone.as_deref(), Some("冷峻"));
    }

    #[tokio::test]
    async fn test_generate_success_restates_estimate_from_results() {
        let returned = vec![
            branch("主线A", "林晚重返旧港", Some("码头的灯又亮了")),
            branch("支线B", "老对手的邀约", None),
        ];
        let payload = MultiNarrativePayload {
            branches: returned.clone(),
            token_usage: Some(TokenUsageDto {
                prompt_tokens: 40,
                completion_tokens: 700,
                total_tokens: 740,
            }),
        };
        let backend = Arc::new(ScriptedBackend::ok(payload));
        let mut lab = NarrativeLab::new(backend);
        lab.set_theme("双城记");

        lab.generate().await.unwrap();

        assert_eq!(lab.results().len(), 2);
        assert_eq!(lab.remote_usage().unwrap().total_tokens, 740);
        assert_eq!(lab.error(), None);

        let expected = tokens::estimate_for_branches(
            "双城记",
            &[
                "主线A 林晚重返旧港 码头的灯又亮了".to_string(),
                "支线B 老对手的邀约".to_string(),
            ],
            lab.target_tokens(),
        );
        assert_eq!(
            lab.estimated(),
            expected,
            "post-run estimate is recomputed from the returned branches"
        );
    }

    #[tokio::test]
    async fn test_generate_failure_records_message() {
        let backend = Arc::new(ScriptedBackend::failing("模型过载"));
        let mut lab = NarrativeLab::new(backend);
        lab.set_theme("双城记");

        let err = lab.generate().await.unwrap_err();
        assert_eq!(err.to_string(), "模型过载");
        assert_eq!(lab.error(), Some("模型过载"));
        assert!(lab.results().is_empty());
        assert_eq!(lab.remote_usage(), None);
    }
}
