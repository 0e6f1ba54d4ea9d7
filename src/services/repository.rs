use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join3;
use log::info;

use crate::core::envelope::Envelope;
use crate::core::error::{ApiError, ApiResult};
use crate::core::models::{
    BeatGenerateRequest, BrainstormPayload, BrainstormRequest, CompassNode, CompassPayload,
    CreateOrderRequest, CreatePaymentOrder, CreateProjectRequest, GenerateResponse, LoginRequest,
    LoginResult, MediaAsset, MediaGenerateRequest, MemoryCompassRequest, MultiNarrativePayload,
    MultiNarrativeRequest, PaymentPlan, PaymentPointsTier, PaymentPlanList, PlotGenerateRequest,
    PointsBalance, PointsOrderRequest, PointsTransaction, ProjectDto, ProjectPage, ProjectPatch,
    ProjectQuery, ProtagonistPayload, ProtagonistRequest, RegisterRequest, SceneBeat,
    ScriptGenerateRequest, ScriptPayload, SequenceBeats, StoryCoreAdvanceRequest,
    SupportingCharacter, TransactionHistory, UserDto, parse_supporting_characters,
};
use crate::core::session::Session;
use crate::services::client::{ApiClient, Endpoint};

/// Everything the user-center screen shows, fetched in one go.
#[derive(Debug, Clone)]
pub struct UserCenterSnapshot {
    pub points: PointsBalance,
    pub transactions: Vec<PointsTransaction>,
    pub plans: Vec<PaymentPlan>,
    pub tiers: Vec<PaymentPointsTier>,
}

/// The slice of the backend the stateful services consume. Kept narrow so
/// tests can stand in a scripted double.
#[async_trait]
pub trait NovelBackend: Send + Sync {
    async fn create_project(&self, name: &str, idea: Option<&str>) -> ApiResult<ProjectDto>;
    async fn fetch_project(&self, project_id: &str) -> ApiResult<ProjectDto>;
    async fn generate_brainstorm(&self, request: &BrainstormRequest) -> ApiResult<Vec<String>>;
    async fn advance_story_core(&self, project_id: &str, story_core: &str) -> ApiResult<()>;
    async fn generate_protagonist(&self, project_id: &str) -> ApiResult<Option<String>>;
    async fn generate_supporting(&self, project_id: &str) -> ApiResult<Vec<SupportingCharacter>>;
    async fn generate_plot(&self, project_id: &str) -> ApiResult<Option<String>>;
    async fn generate_beats(&self, project_id: &str, sequence_id: &str)
        -> ApiResult<Vec<SceneBeat>>;
    async fn generate_script(&self, project_id: &str, beats: Vec<String>) -> ApiResult<String>;
    async fn generate_multi_narrative(
        &self,
        request: &MultiNarrativeRequest,
    ) -> ApiResult<MultiNarrativePayload>;
    async fn generate_memory_compass(
        &self,
        project_id: &str,
        focus: &str,
        anchors: &[String],
    ) -> ApiResult<Vec<CompassNode>>;
    async fn generate_image(&self, prompt: &str, style: Option<&str>)
        -> ApiResult<Option<MediaAsset>>;
    async fn generate_video(&self, prompt: &str, seconds: u32) -> ApiResult<Option<MediaAsset>>;
}

/// One method per backend capability. Envelope unwrapping and the session
/// side effects (persist on login, wipe on logout) live here, so callers
/// only ever see domain types.
pub struct NovelRepository {
    client: ApiClient,
    session: Arc<Session>,
}

impl NovelRepository {
    pub fn new(client: ApiClient, session: Arc<Session>) -> Self {
        Self { client, session }
    }

    // --- Auth ---

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<UserDto> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let envelope: Envelope<LoginResult> = self
            .client
            .request(Endpoint::post("auth/login").json(&request)?)
            .await?;
        let result = envelope.into_data("登录失败")?;
        self.session
            .set(&result.token)
            .await
            .map_err(|err| ApiError::Api(format!("无法保存登录状态：{err}")))?;
        info!("User {} logged in", result.user.username);
        Ok(result.user)
    }

    /// Registers the account and immediately logs it in.
    pub async fn register(&self, request: &RegisterRequest) -> ApiResult<UserDto> {
        let envelope: Envelope<UserDto> = self
            .client
            .request(Endpoint::post("auth/register").json(request)?)
            .await?;
        envelope.into_data("注册失败")?;
        self.login(&request.username, &request.password).await
    }

    pub async fn profile(&self) -> ApiResult<UserDto> {
        let envelope: Envelope<UserDto> =
            self.client.request(Endpoint::get("auth/profile")).await?;
        envelope.into_data("无法获取用户信息")
    }

    pub async fn logout(&self) -> ApiResult<()> {
        self.session
            .clear()
            .await
            .map_err(|err| ApiError::Api(format!("无法清除登录状态：{err}")))
    }

    // --- Projects ---

    pub async fn fetch_projects(&self, query: &ProjectQuery) -> ApiResult<ProjectPage> {
        let envelope: Envelope<ProjectPage> = self
            .client
            .request(Endpoint::get("projects").queries(query.to_pairs()))
            .await?;
        envelope.into_data("项目列表为空")
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        patch: &ProjectPatch,
    ) -> ApiResult<ProjectDto> {
        let envelope: Envelope<ProjectDto> = self
            .client
            .request(Endpoint::put(format!("projects/{project_id}")).json(patch)?)
            .await?;
        envelope.into_data("更新失败")
    }

    /// Fire and forget; the server answer is not inspected beyond transport.
    pub async fn delete_project(&self, project_id: &str) -> ApiResult<()> {
        let _: Envelope<serde_json::Value> = self
            .client
            .request(Endpoint::delete(format!("projects/{project_id}")))
            .await?;
        Ok(())
    }

    // --- Points & payments ---

    pub async fn fetch_points(&self) -> ApiResult<PointsBalance> {
        let envelope: Envelope<PointsBalance> =
            self.client.request(Endpoint::get("points/balance")).await?;
        envelope.into_data("积分数据为空")
    }

    pub async fn fetch_transactions(&self) -> ApiResult<Vec<PointsTransaction>> {
        let envelope: Envelope<TransactionHistory> = self
            .client
            .request(Endpoint::get("points/transactions"))
            .await?;
        Ok(envelope.into_data("交易数据为空")?.transactions)
    }

    pub async fn fetch_payment_plans(&self) -> ApiResult<PaymentPlanList> {
        let envelope: Envelope<PaymentPlanList> =
            self.client.request(Endpoint::get("payments/plans")).await?;
        envelope.into_data("套餐为空")
    }

    pub async fn create_payment_order(
        &self,
        plan_id: &str,
        channel: &str,
    ) -> ApiResult<CreatePaymentOrder> {
        let request = CreateOrderRequest {
            plan_id: plan_id.to_string(),
            channel: channel.to_string(),
        };
        let envelope: Envelope<CreatePaymentOrder> = self
            .client
            .request(Endpoint::post("payments/orders").json(&request)?)
            .await?;
        envelope.into_data("订单创建失败")
    }

    pub async fn create_points_order(
        &self,
        points_tier: &str,
        channel: &str,
    ) -> ApiResult<CreatePaymentOrder> {
        let request = PointsOrderRequest {
            points_tier: points_tier.to_string(),
            channel: channel.to_string(),
        };
        let envelope: Envelope<CreatePaymentOrder> = self
            .client
            .request(Endpoint::post("payments/points").json(&request)?)
            .await?;
        envelope.into_data("订单创建失败")
    }

    /// The three user-center reads run concurrently; one failure fails the
    /// snapshot so the screen never shows a half-stale mix.
    pub async fn fetch_user_center(&self) -> ApiResult<UserCenterSnapshot> {
        let (points, transactions, plan_list) = try_join3(
            self.fetch_points(),
            self.fetch_transactions(),
            self.fetch_payment_plans(),
        )
        .await?;
        Ok(UserCenterSnapshot {
            points,
            transactions,
            plans: plan_list.plans,
            tiers: plan_list.points_tiers,
        })
    }
}

#[async_trait]
impl NovelBackend for NovelRepository {
    async fn create_project(&self, name: &str, idea: Option<&str>) -> ApiResult<ProjectDto> {
        let request = CreateProjectRequest {
            project_name: name.to_string(),
            first_idea: idea
                .map(str::trim)
                .filter(|i| !i.is_empty())
                .map(str::to_string),
        };
        let envelope: Envelope<ProjectDto> = self
            .client
            .request(Endpoint::post("projects").json(&request)?)
            .await?;
        envelope.into_data("创建失败")
    }

    async fn fetch_project(&self, project_id: &str) -> ApiResult<ProjectDto> {
        let envelope: Envelope<ProjectDto> = self
            .client
            .request(Endpoint::get(format!("projects/{project_id}")))
            .await?;
        envelope.into_data("未找到项目")
    }

    async fn generate_brainstorm(&self, request: &BrainstormRequest) -> ApiResult<Vec<String>> {
        let envelope: Envelope<BrainstormPayload> = self
            .client
            .request(Endpoint::post("llm/brainstorm").json(request)?)
            .await?;
        let payload = envelope.check("灵感生成失败")?;
        Ok(payload.and_then(|p| p.brainstorm_ideas).unwrap_or_default())
    }

    async fn advance_story_core(&self, project_id: &str, story_core: &str) -> ApiResult<()> {
        let request = StoryCoreAdvanceRequest {
            project_id: project_id.to_string(),
            story_core: story_core.to_string(),
            leading_quantity: 1,
        };
        let envelope: Envelope<serde_json::Value> = self
            .client
            .request(
                Endpoint::post(format!("projects/{project_id}/story-core/advance"))
                    .json(&request)?,
            )
            .await?;
        envelope.check("故事核心推进失败")?;
        Ok(())
    }

    async fn generate_protagonist(&self, project_id: &str) -> ApiResult<Option<String>> {
        let request = ProtagonistRequest {
            project_id: project_id.to_string(),
            leading_quantity: 1,
        };
        let envelope: Envelope<ProtagonistPayload> = self
            .client
            .request(
                Endpoint::post("protagonist/generate")
                    .query("project_id", project_id)
                    .json(&request)?,
            )
            .await?;
        let payload = envelope.check("主角生成失败")?;
        Ok(payload.and_then(|p| p.leading_brief))
    }

    async fn generate_supporting(&self, project_id: &str) -> ApiResult<Vec<SupportingCharacter>> {
        let response: GenerateResponse = self
            .client
            .request(Endpoint::post(format!(
                "projects/{project_id}/generate/supporting"
            )))
            .await?;
        let response = response.checked("配角生成失败")?;
        Ok(parse_supporting_characters(
            response.content.as_deref().unwrap_or(""),
        ))
    }

    async fn generate_plot(&self, project_id: &str) -> ApiResult<Option<String>> {
        let request = PlotGenerateRequest {
            project_id: project_id.to_string(),
        };
        let response: GenerateResponse = self
            .client
            .request(Endpoint::post("sequence-act/generate").json(&request)?)
            .await?;
        let response = response.checked("情节生成失败")?;
        Ok(response
            .data
            .and_then(|d| d.sequence)
            .or(response.content))
    }

    async fn generate_beats(
        &self,
        project_id: &str,
        sequence_id: &str,
    ) -> ApiResult<Vec<SceneBeat>> {
        let request = BeatGenerateRequest {
            project_id: project_id.to_string(),
            sequence_id: sequence_id.to_string(),
        };
        let envelope: Envelope<SequenceBeats> = self
            .client
            .request(Endpoint::post("sequence-beat/generate").json(&request)?)
            .await?;
        let payload = envelope.check("节拍生成失败")?;
        Ok(payload.and_then(|p| p.scene_beats).unwrap_or_default())
    }

    async fn generate_script(&self, project_id: &str, beats: Vec<String>) -> ApiResult<String> {
        let request = ScriptGenerateRequest::new(project_id, beats);
        let envelope: Envelope<ScriptPayload> = self
            .client
            .request(Endpoint::post("llm/generate-universal").json(&request)?)
            .await?;
        let payload = envelope.check("正文生成失败")?;
        Ok(payload
            .and_then(|p| p.generated_content)
            .unwrap_or_default())
    }

    async fn generate_multi_narrative(
        &self,
        request: &MultiNarrativeRequest,
    ) -> ApiResult<MultiNarrativePayload> {
        let envelope: Envelope<MultiNarrativePayload> = self
            .client
            .request(Endpoint::post("llm/multi-narrative").json(request)?)
            .await?;
        Ok(envelope.check("多线叙事失败")?.unwrap_or_default())
    }

    async fn generate_memory_compass(
        &self,
        project_id: &str,
        focus: &str,
        anchors: &[String],
    ) -> ApiResult<Vec<CompassNode>> {
        let request = MemoryCompassRequest {
            project_id: project_id.to_string(),
            focus: focus.to_string(),
            anchors: anchors.to_vec(),
        };
        let envelope: Envelope<CompassPayload> = self
            .client
            .request(Endpoint::post("memory/compass").json(&request)?)
            .await?;
        Ok(envelope
            .check("记忆罗盘生成失败")?
            .map(|p| p.nodes)
            .unwrap_or_default())
    }

    async fn generate_image(
        &self,
        prompt: &str,
        style: Option<&str>,
    ) -> ApiResult<Option<MediaAsset>> {
        let request = MediaGenerateRequest {
            prompt: prompt.to_string(),
            style: style.map(str::to_string),
            seconds: None,
        };
        let envelope: Envelope<MediaAsset> = self
            .client
            .request(Endpoint::post("media/image/generate").json(&request)?)
            .await?;
        envelope.check("图片生成失败")
    }

    async fn generate_video(&self, prompt: &str, seconds: u32) -> ApiResult<Option<MediaAsset>> {
        let request = MediaGenerateRequest {
            prompt: prompt.to_string(),
            style: None,
            seconds: Some(seconds),
        };
        let envelope: Envelope<MediaAsset> = self
            .client
            .request(Endpoint::post("media/video/generate").json(&request)?)
            .await?;
        envelope.check("视频生成失败")
    }
}
