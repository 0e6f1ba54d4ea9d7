use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Password, Select, Text};

use novelcraft::core::config::Config;
use novelcraft::core::models::{
    CreatePaymentOrder, HomeStats, MediaAsset, PaymentPlan, PaymentPointsTier, ProjectDto,
    ProjectPatch, ProjectQuery, RegisterRequest,
};
use novelcraft::core::session::{FileSessionStore, Session};
use novelcraft::services::client::ApiClient;
use novelcraft::services::compass::{CompassDesk, DEFAULT_VIDEO_SECONDS};
use novelcraft::services::narrative::NarrativeLab;
use novelcraft::services::repository::{NovelBackend, NovelRepository, UserCenterSnapshot};
use novelcraft::services::workflow::{CreationTracker, StepKind, StepStatus};
use novelcraft::utils::tokens;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("配置加载失败: {}", e);
            eprintln!("请检查 config.yml，或通过 NOVELCRAFT_API_BASE_URL 指定服务地址。");
            return Err(e);
        }
    };

    let session = Arc::new(Session::new(Arc::new(FileSessionStore::new(
        &config.session_file,
    ))));
    session.hydrate().await?;

    let client = ApiClient::new(&config, session.clone())?;
    let repository = Arc::new(NovelRepository::new(client, session.clone()));

    println!("novelcraft - AI 小说创作终端 ({})", config.base_url);
    if session.is_authenticated().await {
        println!("已恢复上次的登录状态。");
    }

    let mut tracker = CreationTracker::new(repository.clone(), &config.default_project_name);
    let mut lab = NarrativeLab::new(repository.clone());
    let mut desk = CompassDesk::new(repository.clone());

    loop {
        let options = vec![
            "登录 / 注册",
            "项目管理",
            "创作工作流",
            "多线叙事实验室",
            "记忆罗盘与媒体",
            "用户中心",
            "退出登录",
            "退出程序",
        ];
        let Some(choice) = select("请选择操作:", options) else {
            break;
        };
        let outcome = match choice {
            "登录 / 注册" => auth_menu(&repository, &session).await,
            "项目管理" => projects_menu(&repository, &mut tracker).await,
            "创作工作流" => workflow_menu(&mut tracker).await,
            "多线叙事实验室" => narrative_menu(&mut lab).await,
            "记忆罗盘与媒体" => compass_menu(&mut desk).await,
            "用户中心" => user_center_menu(&repository, &session).await,
            "退出登录" => logout(&repository).await,
            _ => break,
        };
        if let Err(err) = outcome {
            println!("操作失败: {}", err);
        }
    }

    Ok(())
}

// --- Prompt helpers ---
// Esc or ctrl-c cancels the prompt; callers treat None as "go back".

fn select<'a>(prompt: &str, options: Vec<&'a str>) -> Option<&'a str> {
    Select::new(prompt, options).prompt().ok()
}

fn text(prompt: &str) -> Option<String> {
    Text::new(prompt)
        .prompt()
        .ok()
        .map(|s| s.trim().to_string())
}

fn text_with_default(prompt: &str, default: &str) -> Option<String> {
    Text::new(prompt)
        .with_default(default)
        .prompt()
        .ok()
        .map(|s| s.trim().to_string())
}

fn password(prompt: &str) -> Option<String> {
    Password::new(prompt).without_confirmation().prompt().ok()
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(message.to_string());
    pb
}

// --- Auth ---

async fn auth_menu(repository: &NovelRepository, session: &Session) -> Result<()> {
    if session.is_authenticated().await {
        let user = repository.profile().await?;
        println!("当前用户: {} (id {})", user.display_name(), user.id);
        return Ok(());
    }

    let Some(choice) = select("账户:", vec!["登录", "注册新账户", "返回"]) else {
        return Ok(());
    };
    match choice {
        "登录" => {
            let Some(username) = text_with_default("用户名:", "user001") else {
                return Ok(());
            };
            let Some(pass) = password("密码:") else {
                return Ok(());
            };
            let user = repository.login(&username, &pass).await?;
            println!("欢迎回来，{}！", user.display_name());
        }
        "注册新账户" => {
            let Some(username) = text("用户名:") else {
                return Ok(());
            };
            let Some(email) = text("邮箱:") else {
                return Ok(());
            };
            let Some(pass) = password("密码:") else {
                return Ok(());
            };
            let Some(nickname) = text_with_default("昵称:", "新用户") else {
                return Ok(());
            };
            let request = RegisterRequest {
                username,
                email,
                password: pass,
                nickname: (!nickname.is_empty()).then_some(nickname),
            };
            let user = repository.register(&request).await?;
            println!("注册成功，已自动登录：{}", user.display_name());
        }
        _ => {}
    }
    Ok(())
}

async fn logout(repository: &NovelRepository) -> Result<()> {
    repository.logout().await?;
    println!("已退出登录。");
    Ok(())
}

// --- Projects ---

struct ProjectItem(ProjectDto);

impl fmt::Display for ProjectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.0.project_name, self.0.status.as_str())?;
        if self.0.is_favorite == Some(true) {
            write!(f, " ★")?;
        }
        Ok(())
    }
}

async fn projects_menu(repository: &NovelRepository, tracker: &mut CreationTracker) -> Result<()> {
    let page = repository.fetch_projects(&ProjectQuery::default()).await?;
    let stats = HomeStats::from_page(&page);
    println!(
        "共 {} 个项目，进行中 {}，已完成 {}，累计 {} 字",
        stats.total, stats.active, stats.completed, stats.words
    );

    let mut options = Vec::new();
    if !page.projects.is_empty() {
        options.push("打开项目");
    }
    options.push("新建项目");
    options.push("返回");
    let Some(choice) = select("项目管理:", options) else {
        return Ok(());
    };
    match choice {
        "打开项目" => {
            let items: Vec<ProjectItem> = page.projects.into_iter().map(ProjectItem).collect();
            let Some(item) = Select::new("选择项目:", items).prompt().ok() else {
                return Ok(());
            };
            project_actions(repository, tracker, item.0).await?;
        }
        "新建项目" => {
            let Some(name) = text("项目名称:") else {
                return Ok(());
            };
            let Some(idea) = text("初始灵感 (可留空):") else {
                return Ok(());
            };
            let project = repository
                .create_project(&name, (!idea.is_empty()).then_some(idea.as_str()))
                .await?;
            println!(
                "已创建项目「{}」(id {})",
                project.project_name, project.project_id
            );
        }
        _ => {}
    }
    Ok(())
}

async fn project_actions(
    repository: &NovelRepository,
    tracker: &mut CreationTracker,
    project: ProjectDto,
) -> Result<()> {
    println!(
        "项目「{}」[{}]",
        project.project_name,
        project.status.as_str()
    );
    if let Some(core) = project.story_core.as_deref() {
        if !core.trim().is_empty() {
            println!("故事核心: {}", core);
        }
    }

    let favorite_label = if project.is_favorite == Some(true) {
        "取消收藏"
    } else {
        "收藏"
    };
    let Some(choice) = select(
        "操作:",
        vec!["在创作工作流中打开", favorite_label, "删除项目", "返回"],
    ) else {
        return Ok(());
    };
    match choice {
        "在创作工作流中打开" => {
            tracker.attach_project(&project.project_id).await?;
            println!("已绑定「{}」，请前往创作工作流。", tracker.project_name);
        }
        "删除项目" => {
            let confirmed = Confirm::new(&format!("确认删除「{}」？", project.project_name))
                .with_default(false)
                .prompt();
            match confirmed {
                Ok(true) => {
                    repository.delete_project(&project.project_id).await?;
                    println!("已删除。");
                }
                Ok(false) | Err(_) => println!("已取消。"),
            }
        }
        c if c == favorite_label => {
            let target = project.is_favorite != Some(true);
            let updated = repository
                .update_project(&project.project_id, &ProjectPatch::favorite(target))
                .await?;
            if updated.is_favorite == Some(true) {
                println!("「{}」已收藏。", updated.project_name);
            } else {
                println!("「{}」已取消收藏。", updated.project_name);
            }
        }
        _ => {}
    }
    Ok(())
}

// --- Creation workflow ---

fn print_steps(tracker: &CreationTracker) {
    println!();
    if tracker.project_id.is_empty() {
        println!("尚未绑定项目，首次执行步骤时会自动创建。");
    } else {
        println!("当前项目: {} ({})", tracker.project_name, tracker.project_id);
    }
    for (i, state) in tracker.steps().iter().enumerate() {
        let mark = match state.status {
            StepStatus::Completed => "✓",
            StepStatus::Running => "…",
            StepStatus::Failed(_) => "✗",
            StepStatus::Idle => " ",
        };
        println!(
            "  {} {}. {} [{}]",
            mark,
            i + 1,
            state.kind.title(),
            state.status.label()
        );
        if let StepStatus::Failed(reason) = &state.status {
            println!("      原因: {}", reason);
        } else if !state.preview.is_empty() {
            println!("      {}", state.preview);
        }
    }
}

async fn workflow_menu(tracker: &mut CreationTracker) -> Result<()> {
    loop {
        print_steps(tracker);

        let mut options = vec!["依次执行全部步骤", "执行单个步骤", "绑定已有项目"];
        if !tracker.script.is_empty() {
            options.push("查看正文");
        }
        options.push("返回");
        let Some(choice) = select("创作工作流:", options) else {
            return Ok(());
        };
        match choice {
            "依次执行全部步骤" => run_all_steps(tracker).await?,
            "执行单个步骤" => run_single_step(tracker).await,
            "绑定已有项目" => {
                if let Some(id) = text("项目ID:") {
                    match tracker.attach_project(&id).await {
                        Ok(()) => println!("已绑定「{}」。", tracker.project_name),
                        Err(err) => println!("绑定失败: {}", err),
                    }
                }
            }
            "查看正文" => println!("{}", tracker.script),
            _ => return Ok(()),
        }
    }
}

async fn run_all_steps(tracker: &mut CreationTracker) -> Result<()> {
    let pb = ProgressBar::new(StepKind::ALL.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )?
            .progress_chars("#>-"),
    );
    for kind in StepKind::ALL {
        pb.set_message(kind.title());
        if let Err(err) = tracker.run_step(kind).await {
            pb.println(format!("「{}」失败: {}", kind.title(), err));
            pb.finish_and_clear();
            return Ok(());
        }
        pb.inc(1);
    }
    pb.finish_with_message("全部步骤完成");
    Ok(())
}

async fn run_single_step(tracker: &mut CreationTracker) {
    let options: Vec<String> = StepKind::ALL
        .iter()
        .map(|kind| format!("{}：{}", kind.title(), kind.description()))
        .collect();
    let Some(choice) = Select::new("选择步骤:", options).prompt().ok() else {
        return;
    };
    let Some(kind) = StepKind::ALL
        .iter()
        .copied()
        .find(|kind| choice.starts_with(kind.title()))
    else {
        return;
    };

    let pb = spinner(&format!("正在执行「{}」", kind.title()));
    let outcome = tracker.run_step(kind).await;
    pb.finish_and_clear();
    match outcome {
        Ok(()) => {
            println!("「{}」完成。", kind.title());
            let state = tracker.step(kind);
            if !state.preview.is_empty() {
                println!("预览: {}", state.preview);
            }
        }
        Err(err) => println!("「{}」失败: {}", kind.title(), err),
    }
}

// --- Narrative lab ---

fn print_lab(lab: &NarrativeLab) {
    println!();
    if lab.theme().is_empty() {
        println!("主题: (未设置)");
    } else {
        println!("主题: {}", lab.theme());
    }
    for (i, branch) in lab.branches().iter().enumerate() {
        println!(
            "  {}. {} | 目标: {} | 基调: {}",
            i + 1,
            if branch.title.is_empty() { "(未命名)" } else { branch.title.as_str() },
            if branch.goal.is_empty() { "-" } else { branch.goal.as_str() },
            if branch.tone.is_empty() { "-" } else { branch.tone.as_str() },
        );
    }
    let est = lab.estimated();
    println!(
        "预计消耗: 输入 {} + 生成 {} = {} tokens (约 ¥{:.2})",
        est.prompt_tokens,
        est.completion_tokens,
        est.total_tokens,
        tokens::cost_in_cny(est.total_tokens)
    );
}

fn print_branches(lab: &NarrativeLab) {
    for branch in lab.results() {
        println!("◆ {}", branch.branch_title);
        println!("  {}", branch.synopsis);
        if let Some(outline) = &branch.beat_outline {
            for beat in outline {
                println!("   · {}", beat);
            }
        }
        if let Some(hook) = &branch.hook {
            println!("  悬念钩子: {}", hook);
        }
    }
    if let Some(usage) = lab.remote_usage() {
        println!(
            "服务端用量: 输入 {} + 生成 {} = {} tokens",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }
}

fn pick_branch(lab: &NarrativeLab) -> Option<usize> {
    let options: Vec<String> = lab
        .branches()
        .iter()
        .enumerate()
        .map(|(i, b)| format!("{}. {}", i + 1, b.title))
        .collect();
    let choice = Select::new("选择分支:", options).prompt().ok()?;
    choice
        .split('.')
        .next()?
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n >= 1)
        .map(|n| n - 1)
}

fn edit_branch(lab: &mut NarrativeLab) {
    let Some(index) = pick_branch(lab) else {
        return;
    };
    if let Some(title) = text_with_default("分支标题:", &lab.branches()[index].title) {
        lab.set_branch_title(index, &title);
    }
    if let Some(goal) = text_with_default("分支目标:", &lab.branches()[index].goal) {
        lab.set_branch_goal(index, &goal);
    }
    if let Some(tone) = text_with_default("分支基调:", &lab.branches()[index].tone) {
        lab.set_branch_tone(index, &tone);
    }
}

async fn narrative_menu(lab: &mut NarrativeLab) -> Result<()> {
    loop {
        print_lab(lab);

        let options = vec![
            "设置主题",
            "设置项目ID",
            "编辑分支",
            "新增分支",
            "删除分支",
            "设置生成预算",
            "开始生成",
            "返回",
        ];
        let Some(choice) = select("多线叙事实验室:", options) else {
            return Ok(());
        };
        match choice {
            "设置主题" => {
                if let Some(theme) = text("主题:") {
                    lab.set_theme(&theme);
                }
            }
            "设置项目ID" => {
                if let Some(id) = text("项目ID (可留空):") {
                    lab.project_id = id;
                }
            }
            "编辑分支" => edit_branch(lab),
            "新增分支" => lab.add_branch(),
            "删除分支" => {
                if let Some(index) = pick_branch(lab) {
                    lab.remove_branch(index);
                }
            }
            "设置生成预算" => {
                if let Some(raw) = text("目标生成 token 数:") {
                    lab.set_target_tokens(&raw);
                }
            }
            "开始生成" => {
                let pb = spinner("正在生成多线叙事");
                let outcome = lab.generate().await;
                pb.finish_and_clear();
                match outcome {
                    Ok(()) => print_branches(lab),
                    Err(err) => println!("生成失败: {}", err),
                }
            }
            _ => return Ok(()),
        }
    }
}

// --- Memory compass & media ---

fn print_asset(label: &str, asset: Option<&MediaAsset>) {
    match asset {
        Some(asset) => match asset.url.as_deref().or(asset.preview.as_deref()) {
            Some(url) => println!("{}已生成: {}", label, url),
            None => println!(
                "{}任务已提交 (请求号 {})",
                label,
                asset.request_id.as_deref().unwrap_or("-")
            ),
        },
        None => println!("{}任务已提交，稍后可再次生成查看。", label),
    }
}

async fn compass_menu(desk: &mut CompassDesk) -> Result<()> {
    loop {
        println!();
        if desk.focus.is_empty() {
            println!("记忆焦点: (未设置)");
        } else {
            println!("记忆焦点: {}", desk.focus);
        }
        if !desk.anchors().is_empty() {
            println!("锚点: {}", desk.anchors().join("、"));
        }

        let options = vec![
            "设置项目ID",
            "设置记忆焦点",
            "添加锚点",
            "移除锚点",
            "生成记忆罗盘",
            "生成插画",
            "生成短片",
            "返回",
        ];
        let Some(choice) = select("记忆罗盘与媒体:", options) else {
            return Ok(());
        };
        match choice {
            "设置项目ID" => {
                if let Some(id) = text("项目ID:") {
                    desk.project_id = id;
                }
            }
            "设置记忆焦点" => {
                if let Some(focus) = text("记忆焦点:") {
                    desk.focus = focus;
                }
            }
            "添加锚点" => {
                if let Some(anchor) = text("锚点关键词:") {
                    desk.add_anchor(&anchor);
                }
            }
            "移除锚点" => {
                if desk.anchors().is_empty() {
                    println!("暂无锚点。");
                } else if let Some(anchor) =
                    Select::new("移除哪个锚点:", desk.anchors().to_vec()).prompt().ok()
                {
                    desk.remove_anchor(&anchor);
                }
            }
            "生成记忆罗盘" => {
                let pb = spinner("正在梳理记忆罗盘");
                let outcome = desk.generate_compass().await;
                pb.finish_and_clear();
                match outcome {
                    Ok(()) => {
                        for node in &desk.nodes {
                            match node.relation.as_deref() {
                                Some(relation) => println!("◆ {} ({})", node.title, relation),
                                None => println!("◆ {}", node.title),
                            }
                            if !node.summary.is_empty() {
                                println!("   {}", node.summary);
                            }
                        }
                    }
                    Err(err) => println!("生成失败: {}", err),
                }
            }
            "生成插画" => {
                if let Some(prompt) = text("图片提示:") {
                    let style = text("画风 (可留空):").filter(|s| !s.is_empty());
                    let pb = spinner("正在生成插画");
                    let outcome = desk.generate_image(&prompt, style.as_deref()).await;
                    pb.finish_and_clear();
                    match outcome {
                        Ok(()) => print_asset("插画", desk.image_asset.as_ref()),
                        Err(err) => println!("生成失败: {}", err),
                    }
                }
            }
            "生成短片" => {
                if let Some(prompt) = text("视频提示:") {
                    let seconds = text("时长 (秒，3-60):")
                        .and_then(|s| s.parse::<u32>().ok())
                        .unwrap_or(DEFAULT_VIDEO_SECONDS);
                    let pb = spinner("正在生成短片");
                    let outcome = desk.generate_video(&prompt, seconds).await;
                    pb.finish_and_clear();
                    match outcome {
                        Ok(()) => print_asset("短片", desk.video_asset.as_ref()),
                        Err(err) => println!("生成失败: {}", err),
                    }
                }
            }
            _ => return Ok(()),
        }
    }
}

// --- User center ---

struct PlanItem(PaymentPlan);

impl fmt::Display for PlanItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} {}",
            self.0.name, self.0.tier_label, self.0.price.amount_formatted, self.0.price.currency
        )?;
        if self.0.popular {
            write!(f, " 🔥")?;
        }
        Ok(())
    }
}

struct TierItem(PaymentPointsTier);

impl fmt::Display for TierItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} 积分 ({})",
            self.0.tier_label, self.0.points, self.0.price_label
        )
    }
}

fn print_user_center(snapshot: &UserCenterSnapshot) {
    let points = &snapshot.points;
    println!(
        "等级 {} ({})，可用积分 {}，冻结 {}，累计获得 {}",
        points.level,
        points.level_name,
        points.usable_points,
        points.frozen_points,
        points.lifetime_earned
    );
    println!(
        "距下一等级还需 {} 积分 (进度 {:.1}%)",
        points.next_level_points, points.level_progress
    );
    if !snapshot.transactions.is_empty() {
        println!("最近交易:");
        for tx in snapshot.transactions.iter().take(5) {
            println!(
                "  {} {} {:+} ({})",
                tx.created_at, tx.reason, tx.amount, tx.status
            );
        }
    }
}

fn pick_channel() -> Option<&'static str> {
    match select("支付方式:", vec!["支付宝", "微信支付"])? {
        "支付宝" => Some("alipay_page"),
        _ => Some("wechat_native"),
    }
}

fn print_order(order: &CreatePaymentOrder) {
    println!(
        "订单 {} 已创建: {} ({} {})",
        order.order.order_no,
        order.order.plan_name,
        order.order.amount.amount_formatted,
        order.order.amount.currency
    );
    match order.credential.target_url() {
        Some(url) => println!("请打开支付链接完成支付: {}", url),
        None => println!("{}", order.credential.display),
    }
}

async fn user_center_menu(repository: &NovelRepository, session: &Session) -> Result<()> {
    if !session.is_authenticated().await {
        println!("请先登录。");
        return Ok(());
    }

    let pb = spinner("正在加载用户中心");
    let snapshot = repository.fetch_user_center().await;
    pb.finish_and_clear();
    let snapshot = snapshot?;
    print_user_center(&snapshot);

    let Some(choice) = select("用户中心:", vec!["购买会员套餐", "购买积分包", "返回"]) else {
        return Ok(());
    };
    match choice {
        "购买会员套餐" => {
            if snapshot.plans.is_empty() {
                println!("暂无可购套餐。");
                return Ok(());
            }
            let items: Vec<PlanItem> = snapshot.plans.into_iter().map(PlanItem).collect();
            let Some(item) = Select::new("选择套餐:", items).prompt().ok() else {
                return Ok(());
            };
            let Some(channel) = pick_channel() else {
                return Ok(());
            };
            let order = repository
                .create_payment_order(&item.0.plan_id, channel)
                .await?;
            print_order(&order);
        }
        "购买积分包" => {
            if snapshot.tiers.is_empty() {
                println!("暂无积分包。");
                return Ok(());
            }
            let items: Vec<TierItem> = snapshot.tiers.into_iter().map(TierItem).collect();
            let Some(item) = Select::new("选择积分包:", items).prompt().ok() else {
                return Ok(());
            };
            let Some(channel) = pick_channel() else {
                return Ok(());
            };
            let order = repository.create_points_order(&item.0.tier, channel).await?;
            print_order(&order);
        }
        _ => {}
    }
    Ok(())
}
