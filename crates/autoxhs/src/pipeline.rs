//! The post pipeline: theme in, published note out.
//!
//! Stages run strictly in order - categorize, title, content, optional
//! interactive refinement, cover image, publish. Only the image stage is
//! allowed to fail softly; a post without a cover is still worth publishing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;

use xhs::{PublishRequest, Publisher, Visibility};

use crate::config::AppConfig;
use crate::content::{auto_categorize, ContentGenerator, PostContent};
use crate::image::ImageGenerator;
use crate::llm::LlmClient;
use crate::search::SearchClient;

/// Per-run switches from the CLI.
#[derive(Debug, Default)]
pub struct PostOptions {
    /// Publish visible to everyone instead of the default private note.
    pub public: bool,
    /// Skip web-search grounding even when a search key is configured.
    pub no_search: bool,
    /// Pause after generation for refinement suggestions.
    pub interactive: bool,
    /// Category override; falls back to the configured one, and `auto`
    /// lets the LLM classify the theme.
    pub category: Option<String>,
}

/// Drives one theme through generation and publication.
pub struct PostPipeline {
    config: AppConfig,
    data_dir: PathBuf,
    publisher: Publisher,
}

impl PostPipeline {
    pub fn new(config: AppConfig, data_dir: PathBuf, publisher: Publisher) -> Self {
        Self {
            config,
            data_dir,
            publisher,
        }
    }

    pub async fn run(&mut self, theme: &str, options: &PostOptions) -> Result<()> {
        let api_key = self
            .config
            .llm_api_key
            .clone()
            .context("LLM_API_KEY is not configured")?;
        let mut llm = LlmClient::new(
            self.config.llm_model.clone(),
            self.config.llm_base_url.clone(),
            api_key,
        )?;

        // Stage 1: settle the category.
        let category = match options.category.as_deref().unwrap_or(&self.config.category) {
            "auto" => {
                println!("🏷️  正在识别主题类别...");
                let slug = auto_categorize(&mut llm, theme).await?;
                println!("   类别: {}", slug.cyan());
                slug
            }
            fixed => crate::content::category_slug(fixed),
        };

        let search = self.search_client(options);
        let mut generator = ContentGenerator::new(llm, &category, &self.data_dir, search);

        // Stage 2: title.
        println!("✍️  正在生成标题...");
        let title = generator.generate_title(theme).await?;
        println!("   标题: {}", title.green());

        // Stage 3: full post, grounded in search when available.
        println!("📝 正在创作正文...");
        let mut post = generator.generate_content(&title).await?;
        print_post(&post);

        // Stage 4: optional refinement loop.
        if options.interactive {
            post = refine_loop(&mut generator, post).await?;
        }

        // Stage 5: cover image, best effort.
        let images = match self.generate_cover(&mut generator, &post).await {
            Ok(Some(path)) => vec![path],
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "cover generation failed, publishing without image");
                println!("⚠️  封面生成失败，将不带图片发布");
                Vec::new()
            }
        };

        // Stage 6: publish.
        println!("🚀 正在发布...");
        let visibility = if options.public {
            Visibility::Public
        } else {
            Visibility::Private
        };
        let result = self
            .publisher
            .publish(PublishRequest {
                title: post.title.clone(),
                body: post.body.clone(),
                images,
                tags: post.tags.clone(),
                visibility,
            })
            .await?;

        println!("\n✅ 发布成功");
        println!("   标题: {}", post.title);
        if let Some(id) = result.note_id() {
            println!("   笔记: https://www.xiaohongshu.com/explore/{id}");
        }
        Ok(())
    }

    fn search_client(&self, options: &PostOptions) -> Option<SearchClient> {
        if options.no_search || !self.config.search_enabled {
            return None;
        }
        let key = self.config.search_api_key.as_ref()?;
        match SearchClient::new(key.clone()) {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(error = %err, "search client unavailable");
                None
            }
        }
    }

    /// Generate the cover image; `Ok(None)` means no image backend is
    /// configured, which is not an error.
    async fn generate_cover(
        &self,
        generator: &mut ContentGenerator,
        post: &PostContent,
    ) -> Result<Option<PathBuf>> {
        let Some(api_key) = self.config.image_api_key.clone() else {
            tracing::info!("no image API key, skipping cover generation");
            return Ok(None);
        };

        println!("🎨 正在生成封面...");
        let prompt = generator.generate_image_prompt(&post.title, &post.body).await?;
        tracing::debug!(prompt, "image prompt");

        let images = ImageGenerator::new(
            self.config.image_model.clone(),
            self.config.image_base_url.clone(),
            api_key,
        )?;
        let save_path = self
            .data_dir
            .join("images")
            .join(format!("{}.png", Local::now().format("%Y%m%d_%H%M%S")));
        let saved = images.generate(&prompt, &save_path, "1024x1024").await?;
        println!("   封面: {}", saved.display());
        Ok(Some(saved))
    }
}

async fn refine_loop(
    generator: &mut ContentGenerator,
    mut post: PostContent,
) -> Result<PostContent> {
    loop {
        let satisfied = dialoguer::Confirm::new()
            .with_prompt("对当前内容满意吗？")
            .default(true)
            .interact()?;
        if satisfied {
            return Ok(post);
        }

        let suggestion: String = dialoguer::Input::new()
            .with_prompt("修改建议")
            .interact_text()?;
        println!("📝 正在修改...");
        post = generator.refine_content(&suggestion).await?;
        print_post(&post);
    }
}

fn print_post(post: &PostContent) {
    println!("\n{}", "─".repeat(40));
    println!("{}", post.title.bold());
    println!("\n{}", post.body);
    let tags = post.format_tags();
    if !tags.is_empty() {
        println!("\n{}", tags.blue());
    }
    println!("{}\n", "─".repeat(40));
}
