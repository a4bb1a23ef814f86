//! Post content generation.
//!
//! All creative work goes through forced function calling so the output is
//! structured: a titles function for the headline, a creator function for the
//! full post, and a prompt function for the cover image description. The
//! system prompt is category-specific and can be overridden by a markdown
//! file in the data directory.

use std::path::Path;

use anyhow::{bail, Result};
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::search::SearchClient;

/// Content categories: display name, prompt file slug, description shown to
/// the classifier.
pub const CATEGORIES: &[(&str, &str, &str)] = &[
    ("美食分享", "Food_Sharing", "美食体验、餐厅推荐、美食制作教程"),
    ("旅行攻略", "Travel_Guides", "旅行日记、目的地推荐、行程规划"),
    ("时尚穿搭", "Fashion_Outfits", "日常穿搭、服饰搭配、时尚趋势"),
    ("美妆护肤", "Beauty_&_Skincare", "化妆技巧、护肤品评测、美妆心得"),
    ("健康生活", "Healthy_Living", "健康饮食、运动健身、生活习惯"),
    ("学习提升", "Learning_&_Growth", "语言学习、职场技能、个人成长"),
    ("家居生活", "Home_Life", "家居装饰、生活技巧、家电推荐"),
    ("心情日记", "Mood_Diary", "情感体验、生活随笔、个人感悟"),
    ("宠物天地", "Pet_World", "宠物护理、宠物趣事分享"),
    ("二手交易", "Second-hand_Trade", "二手物品买卖交流"),
    ("产品推荐", "Product_Recommendations", "产品评测、优惠信息、购买建议"),
];

const DEFAULT_SLUG: &str = "Default";

/// Built-in system prompt, used when the data directory carries no override
/// for the category.
const DEFAULT_PROMPT: &str = "\
你是一位资深的小红书爆款文案创作者。

创作要求：
1. 标题：带有情绪价值，使用数字、悬念或反差，20字以内，可以带1-2个合适的emoji
2. 正文：口语化表达，真诚分享的语气，分段清晰，适当使用emoji增加亲和力
3. 正文长度控制在300-600字之间
4. 标签：给出3个与内容强相关的话题标签，以逗号分隔
5. 不要使用markdown格式符号
";

/// A generated post, before topic resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostContent {
    pub title: String,
    pub body: String,
    /// Comma-separated tag string as the model produced it.
    pub tags: String,
}

impl PostContent {
    /// Tags rendered for display: `#`-prefixed, space-joined.
    #[must_use]
    pub fn format_tags(&self) -> String {
        self.tags
            .replace(['，', '、'], ",")
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(|tag| {
                if tag.starts_with('#') {
                    tag.to_string()
                } else {
                    format!("#{tag}")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn titles_schema() -> Value {
    json!({
        "description": "生成小红书爆款标题",
        "parameters": {
            "type": "object",
            "properties": {
                "标题列表": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "1个吸引人的小红书标题"
                }
            },
            "required": ["标题列表"]
        }
    })
}

fn creator_schema() -> Value {
    json!({
        "description": "生成完整的小红书贴文",
        "parameters": {
            "type": "object",
            "properties": {
                "标题": { "type": "string", "description": "贴文标题" },
                "正文": { "type": "string", "description": "贴文正文内容" },
                "Tags": {
                    "type": "string",
                    "description": "3个相关话题标签，以逗号分隔，不要超过3个"
                }
            },
            "required": ["标题", "正文", "Tags"]
        }
    })
}

fn image_prompt_schema() -> Value {
    json!({
        "description": "生成图片描述提示词",
        "parameters": {
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "用于AI生成图片的详细英文描述"
                }
            },
            "required": ["prompt"]
        }
    })
}

/// Generates post content for one category.
pub struct ContentGenerator {
    llm: LlmClient,
    search: Option<SearchClient>,
    system_prompt: String,
}

impl ContentGenerator {
    /// Build a generator for `category` (a prompt file slug). The system
    /// prompt is loaded from `data_dir/prompt/theme/{slug}.md` when present.
    pub fn new(
        llm: LlmClient,
        category: &str,
        data_dir: &Path,
        search: Option<SearchClient>,
    ) -> Self {
        let system_prompt = load_prompt(data_dir, category);
        Self {
            llm,
            search,
            system_prompt,
        }
    }

    /// Generate one title for the theme. Titles are written from the theme
    /// alone; search grounding only enters at the content stage.
    pub async fn generate_title(&mut self, theme: &str) -> Result<String> {
        self.llm.clear_history(0);

        let user_message = format!("主题：{theme}，请生成1个标题");
        let result = self
            .llm
            .chat_with_function(&user_message, &self.system_prompt, "titles", titles_schema())
            .await?;

        let title = first_title(&result["标题列表"]);
        match title {
            Some(title) => Ok(title),
            None => bail!("model produced no title for theme `{theme}`"),
        }
    }

    /// Generate the full post for a settled title, grounded in search results
    /// when a search client is configured.
    pub async fn generate_content(&mut self, title: &str) -> Result<PostContent> {
        let context = match &self.search {
            Some(search) => {
                tracing::info!(title, "searching for grounding data");
                search.search_for_context(title).await
            }
            None => String::new(),
        };

        let user_message = if context.is_empty() {
            format!("请根据这个标题创作完整的小红书贴文：{title}")
        } else {
            format!(
                "请根据这个标题创作完整的小红书贴文：{title}\n\n{context}\n\n\
                 【创作要求 - 非常重要！】\n\
                 1. ⚠️ 必须基于上述搜索结果中的【真实数据】创作内容\n\
                 2. ⚠️ 必须使用搜索结果中出现的真实店铺名称、地址、价格等信息\n\
                 3. ⚠️ 不要虚构任何店铺、地址、价格或评价\n\
                 4. ⚠️ 如果搜索结果中有具体的推荐菜品、服务、产品，请直接使用\n\
                 5. ⚠️ 如果搜索结果信息不足，可以基于已有信息合理扩展，但核心数据必须真实\n\
                 6. 只生成3个标签，不要超过3个"
            )
        };

        let result = self
            .llm
            .chat_with_function(
                &user_message,
                &self.system_prompt,
                "xhs_creator",
                creator_schema(),
            )
            .await?;

        Ok(post_from_result(&result, title))
    }

    /// Rewrite the current post per the user's suggestion. Relies on the
    /// conversation history carrying the previous version.
    pub async fn refine_content(&mut self, suggestion: &str) -> Result<PostContent> {
        let result = self
            .llm
            .chat_with_function(
                &format!("请根据以下建议修改贴文：{suggestion}"),
                &self.system_prompt,
                "xhs_creator",
                creator_schema(),
            )
            .await?;

        Ok(post_from_result(&result, ""))
    }

    /// Produce an English text-to-image prompt for the cover.
    pub async fn generate_image_prompt(&mut self, title: &str, body: &str) -> Result<String> {
        const SYSTEM: &str = "\
你是一个专业的AI图片生成提示词专家。
根据用户提供的小红书贴文内容，生成一个适合AI图片生成的详细英文描述。

要求：
1. 使用英文描述
2. 描述要具体、生动，包含场景、色彩、风格等细节
3. 适合作为小红书封面图
4. 风格要时尚、吸引人
5. 避免出现文字、人脸等难以生成的元素
6. 描述长度控制在100词以内";

        let snippet: String = body.chars().take(500).collect();
        let result = self
            .llm
            .chat_with_function(
                &format!("标题：{title}\n\n正文：{snippet}"),
                SYSTEM,
                "image_prompt",
                image_prompt_schema(),
            )
            .await?;

        Ok(result["prompt"]
            .as_str()
            .map_or_else(|| format!("A beautiful aesthetic image about {title}"), str::to_string))
    }
}

/// Classify a theme into one of the known categories; anything the model
/// answers outside the table maps to the default prompt.
pub async fn auto_categorize(llm: &mut LlmClient, theme: &str) -> Result<String> {
    let listing: Vec<String> = CATEGORIES
        .iter()
        .map(|(name, _, description)| format!("- {name}: {description}"))
        .collect();
    let system_prompt = format!(
        "你是一个分类专家。根据用户输入的主题，选择最匹配的类别。\n\n\
         可选类别：\n{}\n\n\
         只返回类别名称（中文），不要其他内容。如果都不匹配，返回\"默认\"。",
        listing.join("\n")
    );

    let answer = llm
        .simple_chat(&format!("主题：{theme}"), Some(&system_prompt))
        .await?;
    let name = answer.trim().trim_matches(['"', '\'']);

    Ok(category_slug(name))
}

/// Prompt file slug for a category display name.
#[must_use]
pub fn category_slug(name: &str) -> String {
    CATEGORIES
        .iter()
        .find(|(cn, _, _)| *cn == name)
        .map_or(DEFAULT_SLUG, |(_, slug, _)| *slug)
        .to_string()
}

/// Load the category system prompt, falling back to the category-agnostic
/// default file and finally the built-in prompt.
fn load_prompt(data_dir: &Path, category: &str) -> String {
    let theme_dir = data_dir.join("prompt").join("theme");
    for slug in [category, DEFAULT_SLUG] {
        let path = theme_dir.join(format!("{slug}.md"));
        if let Ok(prompt) = std::fs::read_to_string(&path) {
            tracing::debug!(path = %path.display(), "loaded system prompt");
            return prompt;
        }
    }
    DEFAULT_PROMPT.to_string()
}

fn post_from_result(result: &Value, fallback_title: &str) -> PostContent {
    let title = result["标题"].as_str().unwrap_or(fallback_title);
    PostContent {
        title: clean_text(title),
        body: clean_text(result["正文"].as_str().unwrap_or_default()),
        tags: result["Tags"].as_str().unwrap_or_default().to_string(),
    }
}

/// Pull the first title out of the model's answer. Tolerates a JSON array,
/// a JSON-encoded array in a string, or plain newline-separated text.
fn first_title(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|t| !t.is_empty())
            .map(str::to_string),
        Value::String(raw) => {
            if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
                if parsed.is_array() {
                    return first_title(&parsed);
                }
            }
            raw.lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
        }
        _ => None,
    }
}

/// Strip markdown leftovers the platform renders literally: runs of two or
/// more `#` and every `*`. A single `#` survives since it may open a hashtag.
fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '#' => {
                let mut run = 1;
                while chars.peek() == Some(&'#') {
                    chars.next();
                    run += 1;
                }
                if run == 1 {
                    out.push('#');
                }
            }
            '*' => {}
            other => out.push(other),
        }
    }
    out.trim().to_string()
}
