//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use seoflow_cms::{CmsClient, CmsClientFactory, Taxonomy, WordPressFactory};
use seoflow_core::worker::{DEFAULT_CLAIM_LEASE_SECS, JobOutcome, ProgressReporter};
use seoflow_core::{
    CallToAction, ConnectionResolver, ContextAssembler, DraftGenerator, DraftRefiner,
    DraftRequest, EnqueueRequest, IdeaGenerator, ImportBundle, PublishOverrides, PublishService,
    PublishWorker, StorageQueue, import_bundle,
};
use seoflow_llm::{ChatClient, OpenAiCompatClient};
use seoflow_shared::{
    AppConfig, ContentType, ContextSnapshot, HeroImageAsset, IdeaCategory, IdeaStatus, PublishJob,
    init_config, load_config, validate_api_key,
};
use seoflow_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// seoflow: SEO content from business hypotheses.
#[derive(Parser)]
#[command(
    name = "seoflow",
    version,
    about = "Generate SEO ideas and drafts from business hypotheses and publish them to a CMS.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Acting user, recorded on ideas and publish jobs.
    #[arg(long, env = "SEOFLOW_USER", global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Load projects, hypotheses, profiles, clusters, and CMS settings from a JSON bundle.
    Import {
        /// Path to the bundle file.
        path: PathBuf,
    },

    /// Inspect the assembled generation context.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Generate and browse content ideas.
    Ideas {
        #[command(subcommand)]
        action: IdeasAction,
    },

    /// Generate, refine, and inspect drafts.
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },

    /// Queue drafts for publishing and run the publish worker.
    Publish {
        #[command(subcommand)]
        action: PublishAction,
    },

    /// Check the CMS connection of a project.
    Cms {
        #[command(subcommand)]
        action: CmsAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ContextAction {
    /// Print the context snapshot as JSON.
    Show {
        project: String,
        hypothesis: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum IdeasAction {
    /// Generate ideas for one category and store the new ones.
    Generate {
        project: String,
        hypothesis: String,

        /// PAIN, GOAL, TRIGGER, FEATURE, BENEFIT, FAQ, COMPARISON, or INFORMATIONAL.
        #[arg(short, long)]
        category: IdeaCategory,

        /// Number of ideas (1-20). Defaults to `defaults.idea_count`.
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Override the resolved context language.
        #[arg(long)]
        language: Option<String>,

        /// Print the candidates without storing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored ideas, newest first.
    List {
        project: String,
        hypothesis: String,

        #[arg(long)]
        status: Option<IdeaStatus>,
    },
}

#[derive(Subcommand)]
pub(crate) enum DraftAction {
    /// Generate a draft for a backlog idea.
    Generate {
        idea: String,

        /// Content type, e.g. article, how_to, landing_page.
        #[arg(short = 't', long, default_value = "article")]
        content_type: ContentType,

        #[arg(long)]
        goal: Option<String>,

        #[arg(long)]
        funnel_stage: Option<String>,

        #[arg(long)]
        requirements: Option<String>,

        #[arg(long)]
        language: Option<String>,

        /// Model to try first; falls back to `llm.default_model`.
        #[arg(long)]
        model: Option<String>,
    },

    /// Revise a draft in place.
    Refine {
        draft: String,

        /// What to change.
        #[arg(short, long)]
        instructions: String,

        #[arg(long)]
        cta_url: Option<String>,

        #[arg(long)]
        cta_text: Option<String>,
    },

    /// Print a draft (Markdown preview unless --html).
    Show {
        draft: String,

        #[arg(long)]
        html: bool,
    },

    /// List drafts of a hypothesis.
    List {
        project: String,
        hypothesis: String,
    },

    /// Record the hero image of a draft.
    Hero {
        draft: String,
        url: String,

        #[arg(long)]
        alt: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum PublishAction {
    /// Queue a draft, or reschedule its queued job with --at.
    Enqueue {
        draft: String,

        #[arg(long)]
        idea: Option<String>,

        /// Publish time (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Force a post status (publish, future, draft, pending, private).
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        slug: Option<String>,

        /// Category IDs, comma-separated. Replaces the configured ones.
        #[arg(long, value_delimiter = ',')]
        categories: Option<Vec<u64>>,

        /// Tag IDs, comma-separated. Replaces the configured ones.
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<u64>>,
    },

    /// Put a failed or published job back in the queue.
    Retry { job: String },

    /// List publish jobs, newest first.
    List {
        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        hypothesis: Option<String>,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Publish due jobs until the queue is idle.
    Work {
        /// Stop after this many jobs.
        #[arg(long)]
        max: Option<usize>,

        /// Seconds before a job stuck in `publishing` is claimed again.
        #[arg(long, default_value_t = DEFAULT_CLAIM_LEASE_SECS)]
        lease_secs: i64,
    },
}

#[derive(Subcommand)]
pub(crate) enum CmsAction {
    /// Verify credentials and list post types.
    Test { project: String },

    /// List categories or tags with their IDs.
    Terms {
        project: String,

        #[arg(long, value_enum, default_value = "categories")]
        taxonomy: TaxonomyArg,
    },
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum TaxonomyArg {
    Categories,
    Tags,
}

impl From<TaxonomyArg> for Taxonomy {
    fn from(arg: TaxonomyArg) -> Self {
        match arg {
            TaxonomyArg::Categories => Taxonomy::Categories,
            TaxonomyArg::Tags => Taxonomy::Tags,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "seoflow=info",
        1 => "seoflow=debug",
        _ => "seoflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let user = cli.user;
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
        Command::Import { path } => cmd_import(&path).await,
        Command::Context {
            action: ContextAction::Show {
                project,
                hypothesis,
            },
        } => cmd_context_show(&project, &hypothesis, user.as_deref()).await,
        Command::Ideas { action } => match action {
            IdeasAction::Generate {
                project,
                hypothesis,
                category,
                count,
                language,
                dry_run,
            } => {
                cmd_ideas_generate(
                    &project,
                    &hypothesis,
                    category,
                    count,
                    language.as_deref(),
                    dry_run,
                    user.as_deref(),
                )
                .await
            }
            IdeasAction::List {
                project,
                hypothesis,
                status,
            } => cmd_ideas_list(&project, &hypothesis, status).await,
        },
        Command::Draft { action } => match action {
            DraftAction::Generate {
                idea,
                content_type,
                goal,
                funnel_stage,
                requirements,
                language,
                model,
            } => {
                let request = DraftRequest {
                    content_type,
                    content_goal: goal,
                    funnel_stage,
                    special_requirements: requirements,
                    language_override: language,
                    model,
                };
                cmd_draft_generate(&idea, &request, user.as_deref()).await
            }
            DraftAction::Refine {
                draft,
                instructions,
                cta_url,
                cta_text,
            } => {
                let cta = CallToAction {
                    url: cta_url.as_deref(),
                    text: cta_text.as_deref(),
                };
                cmd_draft_refine(&draft, &instructions, cta).await
            }
            DraftAction::Show { draft, html } => cmd_draft_show(&draft, html).await,
            DraftAction::List {
                project,
                hypothesis,
            } => cmd_draft_list(&project, &hypothesis).await,
            DraftAction::Hero { draft, url, alt } => cmd_draft_hero(&draft, &url, alt).await,
        },
        Command::Publish { action } => match action {
            PublishAction::Enqueue {
                draft,
                idea,
                at,
                status,
                slug,
                categories,
                tags,
            } => {
                let overrides = PublishOverrides {
                    status,
                    slug,
                    category_ids: categories,
                    tag_ids: tags,
                };
                let has_overrides = overrides != PublishOverrides::default();
                let request = EnqueueRequest {
                    draft_id: draft,
                    idea_id: idea,
                    user_id: require_user(user.as_deref())?.to_string(),
                    publish_at: at,
                    overrides: has_overrides.then_some(overrides),
                };
                cmd_publish_enqueue(request).await
            }
            PublishAction::Retry { job } => {
                cmd_publish_retry(&job, require_user(user.as_deref())?).await
            }
            PublishAction::List {
                project,
                hypothesis,
                limit,
            } => cmd_publish_list(project, hypothesis, limit).await,
            PublishAction::Work { max, lease_secs } => cmd_publish_work(max, lease_secs).await,
        },
        Command::Cms { action } => match action {
            CmsAction::Test { project } => cmd_cms_test(&project).await,
            CmsAction::Terms { project, taxonomy } => cmd_cms_terms(&project, taxonomy.into()).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared wiring
// ---------------------------------------------------------------------------

/// Loaded config plus an open database.
struct App {
    config: AppConfig,
    storage: Arc<Storage>,
}

impl App {
    async fn open() -> Result<Self> {
        let config = load_config()?;
        let path = config.storage.resolved_path()?;
        let storage = Arc::new(Storage::open(&path).await?);
        info!(db = %path.display(), "database opened");
        Ok(Self { config, storage })
    }

    /// Open for listing and previews; never creates or migrates the database.
    async fn open_readonly() -> Result<Self> {
        let config = load_config()?;
        let path = config.storage.resolved_path()?;
        if !path.exists() {
            return Err(eyre!(
                "no database at {}. Run `seoflow import` first.",
                path.display()
            ));
        }
        let storage = Arc::new(Storage::open_readonly(&path).await?);
        Ok(Self { config, storage })
    }

    fn llm(&self) -> Result<Arc<dyn ChatClient>> {
        let api_key = validate_api_key(&self.config)?;
        Ok(Arc::new(OpenAiCompatClient::from_config(&self.config.llm, api_key)?))
    }

    fn assembler(&self) -> ContextAssembler {
        ContextAssembler::new(self.storage.clone(), self.config.defaults.language.clone())
    }

    fn resolver(&self) -> ConnectionResolver {
        ConnectionResolver::new(self.config.cms.clone(), self.storage.clone())
    }

    async fn cms_client(&self, project_id: &str) -> Result<Arc<dyn CmsClient>> {
        let connection = self.resolver().resolve(Some(project_id)).await?;
        let factory = WordPressFactory {
            timeout_secs: self.config.cms.timeout_secs,
        };
        Ok(factory.client_for(&connection)?)
    }
}

fn require_user(user: Option<&str>) -> Result<&str> {
    user.map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| eyre!("this command needs a user: pass --user or set SEOFLOW_USER"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

async fn cmd_import(path: &std::path::Path) -> Result<()> {
    let app = App::open().await?;
    let bundle = ImportBundle::from_path(path)?;
    let summary = import_bundle(&app.storage, &bundle).await?;

    println!();
    println!("  Bundle imported from {}", path.display());
    println!("  Projects:         {}", summary.projects);
    println!("  Hypotheses:       {}", summary.hypotheses);
    println!("  Business models:  {}", summary.business_models);
    println!("  Profiles:         {}", summary.customer_profiles);
    println!("  Keyword clusters: {}", summary.keyword_clusters);
    println!("  CMS connections:  {}", summary.cms_connections);
    println!("  Hero images:      {}", summary.hero_images);
    println!();
    Ok(())
}

async fn cmd_context_show(project: &str, hypothesis: &str, user: Option<&str>) -> Result<()> {
    let app = App::open_readonly().await?;
    let ctx: ContextSnapshot = app.assembler().load(project, hypothesis, user).await?;
    print_json(&ctx)
}

async fn cmd_ideas_generate(
    project: &str,
    hypothesis: &str,
    category: IdeaCategory,
    count: Option<usize>,
    language: Option<&str>,
    dry_run: bool,
    user: Option<&str>,
) -> Result<()> {
    let user = if dry_run { user } else { Some(require_user(user)?) };
    let app = App::open().await?;
    let ctx = app.assembler().load(project, hypothesis, user).await?;
    let count = count.unwrap_or(app.config.defaults.idea_count);
    let language = language.unwrap_or(&ctx.language).to_string();

    let generator = IdeaGenerator::new(
        app.llm()?,
        app.storage.clone(),
        app.config.llm.default_model.clone(),
        app.config.llm.ideas,
    );

    let spinner = Spinner::start(format!("Generating {count} {category} ideas"));
    let candidates = generator.generate(&ctx, category, count, &language).await;
    spinner.finish();
    let candidates = candidates?;

    let Some(user) = user.filter(|_| !dry_run) else {
        return print_json(&candidates);
    };

    let outcome = generator.store(&ctx, &candidates, user).await?;
    println!();
    for idea in &outcome.created {
        println!("  {}  {}", idea.id, idea.title);
    }
    println!();
    println!(
        "  Created {} ideas, skipped {} duplicates",
        outcome.created.len(),
        outcome.skipped_duplicates
    );
    println!();
    Ok(())
}

async fn cmd_ideas_list(project: &str, hypothesis: &str, status: Option<IdeaStatus>) -> Result<()> {
    let app = App::open_readonly().await?;
    let ideas = app.storage.list_ideas(project, hypothesis, status).await?;
    for idea in &ideas {
        println!(
            "{}  [{:<9}] {:<13} {}",
            idea.id, idea.status, idea.category, idea.title
        );
    }
    if ideas.is_empty() {
        println!("no ideas");
    }
    Ok(())
}

async fn cmd_draft_generate(idea_id: &str, request: &DraftRequest, user: Option<&str>) -> Result<()> {
    let user = require_user(user)?;
    let app = App::open().await?;
    let idea = app
        .storage
        .get_idea(idea_id)
        .await?
        .ok_or_else(|| eyre!("idea {idea_id} not found"))?;
    let ctx = app
        .assembler()
        .load(&idea.project_id, &idea.hypothesis_id, Some(user))
        .await?;

    let generator = DraftGenerator::new(
        app.llm()?,
        app.storage.clone(),
        app.config.llm.default_model.clone(),
        app.config.llm.drafts,
    );

    let spinner = Spinner::start(format!("Writing {} for \"{}\"", request.content_type, idea.title));
    let draft = generator.generate_and_store(&ctx, idea_id, request, user).await;
    spinner.finish();
    let draft = draft?;

    println!();
    println!("  Draft created");
    println!("  ID:       {}", draft.id);
    println!("  Title:    {}", draft.title);
    println!("  Sections: {}", draft.structure.len());
    println!("  Model:    {}", draft.model);
    println!();
    Ok(())
}

async fn cmd_draft_refine(draft_id: &str, instructions: &str, cta: CallToAction<'_>) -> Result<()> {
    let app = App::open().await?;
    let refiner = DraftRefiner::new(
        app.llm()?,
        app.storage.clone(),
        app.config.llm.default_model.clone(),
        app.config.llm.refine,
    );

    let spinner = Spinner::start(format!("Refining draft {draft_id}"));
    let draft = refiner.refine_and_save(draft_id, instructions, cta).await;
    spinner.finish();
    let draft = draft?;

    println!("Draft {} refined ({} characters)", draft.id, seoflow_markup::text_length(&draft.body));
    Ok(())
}

async fn cmd_draft_show(draft_id: &str, html: bool) -> Result<()> {
    let app = App::open_readonly().await?;
    let draft = app
        .storage
        .get_draft(draft_id)
        .await?
        .ok_or_else(|| eyre!("draft {draft_id} not found"))?;

    println!("# {}", draft.title);
    println!();
    println!("> {}", draft.summary);
    println!();
    if html {
        println!("{}", draft.body);
    } else {
        print!("{}", seoflow_markup::to_markdown(&draft.body)?);
    }

    match app.storage.get_hero_image(draft_id).await? {
        Some(hero) => println!("\nhero image: {}", hero.url),
        None => println!("\nhero image: none (required for publishing)"),
    }
    Ok(())
}

async fn cmd_draft_list(project: &str, hypothesis: &str) -> Result<()> {
    let app = App::open_readonly().await?;
    let drafts = app.storage.list_drafts(project, hypothesis).await?;
    for draft in &drafts {
        println!("{}  {:<12} {}", draft.id, draft.content_type, draft.title);
    }
    if drafts.is_empty() {
        println!("no drafts");
    }
    Ok(())
}

async fn cmd_draft_hero(draft_id: &str, url: &str, alt: Option<String>) -> Result<()> {
    let app = App::open().await?;
    if app.storage.get_draft(draft_id).await?.is_none() {
        return Err(eyre!("draft {draft_id} not found"));
    }
    app.storage
        .upsert_hero_image(&HeroImageAsset::new(draft_id, url, alt))
        .await?;
    println!("Hero image recorded for draft {draft_id}");
    Ok(())
}

async fn cmd_publish_enqueue(request: EnqueueRequest) -> Result<()> {
    let app = App::open().await?;
    let service = PublishService::new(app.storage.clone(), app.resolver());
    let job = service.enqueue(request).await?;
    print_job(&job);
    Ok(())
}

async fn cmd_publish_retry(job_id: &str, user: &str) -> Result<()> {
    let app = App::open().await?;
    let service = PublishService::new(app.storage.clone(), app.resolver());
    let job = service.retry(job_id, user).await?;
    print_job(&job);
    Ok(())
}

async fn cmd_publish_list(
    project: Option<String>,
    hypothesis: Option<String>,
    limit: Option<u32>,
) -> Result<()> {
    let app = App::open_readonly().await?;
    let service = PublishService::new(app.storage.clone(), app.resolver());
    let jobs = service.list(project, hypothesis, limit).await?;
    for job in &jobs {
        println!(
            "{}  {:<10} {}  draft={}  {}",
            job.id,
            job.status,
            job.publish_at.to_rfc3339(),
            job.draft_id,
            job.error.as_deref().unwrap_or(&job.message)
        );
    }
    if jobs.is_empty() {
        println!("no publish jobs");
    }
    Ok(())
}

async fn cmd_publish_work(max: Option<usize>, lease_secs: i64) -> Result<()> {
    let app = App::open().await?;
    let factory = WordPressFactory {
        timeout_secs: app.config.cms.timeout_secs,
    };
    let worker = PublishWorker::new(
        Arc::new(
            StorageQueue::new(app.storage.clone()).with_lease(chrono::Duration::seconds(lease_secs)),
        ),
        app.resolver(),
        Arc::new(factory),
    )
    .with_progress(Arc::new(CliProgress::new()));

    let outcomes = worker.run_until_idle(max).await?;
    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, JobOutcome::Failed { .. }))
        .count();

    println!();
    println!("  Processed: {}", outcomes.len());
    println!("  Published: {}", outcomes.len() - failed);
    println!("  Failed:    {failed}");
    println!();
    Ok(())
}

async fn cmd_cms_test(project: &str) -> Result<()> {
    let app = App::open().await?;
    let client = app.cms_client(project).await?;
    client.test_credentials().await?;
    println!("Credentials OK");
    for post_type in client.list_post_types().await? {
        println!(
            "  {:<16} {:<24} rest_base={}",
            post_type.slug,
            post_type.name,
            post_type.rest_base.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn cmd_cms_terms(project: &str, taxonomy: Taxonomy) -> Result<()> {
    let app = App::open().await?;
    let client = app.cms_client(project).await?;
    let terms = client.list_terms(taxonomy).await?;
    for term in &terms {
        println!("{:>6}  {:<32} {}", term.id, term.name, term.slug);
    }
    println!("{} {}", terms.len(), taxonomy.path());
    Ok(())
}

fn print_job(job: &PublishJob) {
    println!();
    println!("  Job:        {}", job.id);
    println!("  Draft:      {}", job.draft_id);
    println!("  Status:     {}", job.status);
    println!("  Publish at: {}", job.publish_at.to_rfc3339());
    println!("  Message:    {}", job.message);
    println!();
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

/// Spinner shown while waiting on the model.
struct Spinner(ProgressBar);

impl Spinner {
    fn start(message: String) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self(bar)
    }

    fn finish(self) {
        self.0.finish_and_clear();
    }
}

/// Publish worker progress on an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn job_started(&self, job: &PublishJob) {
        self.spinner
            .set_message(format!("Publishing {} (draft {})", job.id, job.draft_id));
    }

    fn step(&self, job_id: &str, step: &str) {
        self.spinner.set_message(format!("[{job_id}] {step}"));
    }

    fn job_finished(&self, outcome: &JobOutcome) {
        let line = match outcome {
            JobOutcome::Published {
                job_id,
                remote_url,
                ..
            } => format!(
                "published {job_id} {}",
                remote_url.as_deref().unwrap_or_default()
            ),
            JobOutcome::Failed { job_id, error } => format!("failed {job_id}: {error}"),
        };
        self.spinner.println(line);
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn enqueue_parses_schedule_and_ids() {
        let cli = Cli::try_parse_from([
            "seoflow",
            "--user",
            "U1",
            "publish",
            "enqueue",
            "D1",
            "--at",
            "2026-11-01T09:00:00Z",
            "--tags",
            "5,8",
        ])
        .unwrap();

        assert_eq!(cli.user.as_deref(), Some("U1"));
        match cli.command {
            Command::Publish {
                action:
                    PublishAction::Enqueue {
                        draft, at, tags, categories, ..
                    },
            } => {
                assert_eq!(draft, "D1");
                assert_eq!(at.unwrap().to_rfc3339(), "2026-11-01T09:00:00+00:00");
                assert_eq!(tags, Some(vec![5, 8]));
                assert_eq!(categories, None);
            }
            _ => panic!("expected publish enqueue"),
        }
    }

    #[test]
    fn idea_category_is_case_insensitive() {
        let cli = Cli::try_parse_from([
            "seoflow", "ideas", "generate", "P1", "H1", "--category", "pain", "-n", "3",
        ])
        .unwrap();
        match cli.command {
            Command::Ideas {
                action: IdeasAction::Generate { category, count, .. },
            } => {
                assert_eq!(category, IdeaCategory::Pain);
                assert_eq!(count, Some(3));
            }
            _ => panic!("expected ideas generate"),
        }
    }

    #[test]
    fn user_is_required_and_trimmed() {
        assert!(require_user(None).is_err());
        assert!(require_user(Some("  ")).is_err());
        assert_eq!(require_user(Some(" U1 ")).unwrap(), "U1");
    }
}
