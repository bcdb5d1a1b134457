//! Scripted browser engine for exercising the pool, fetch controller,
//! extraction pipeline and HTTP surface without launching Chrome.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kodegen_page_scraper::browser::{
    BrowserEngine, BrowserError, BrowserInstance, BrowserResult, PageSession, ResourceKind,
};
use kodegen_page_scraper::fetch::LoadStrategy;
use kodegen_page_scraper::page_extractor::js_scripts::{
    ARTICLE_SCRIPT, BODY_TEXT_SCRIPT, LANGUAGE_SCRIPT, LINKS_SCRIPT, META_TAGS_SCRIPT,
    headings_script,
};
use kodegen_page_scraper::{BrowserPool, FetchConfig, FetchController, PoolConfig};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// What one engine call does
#[derive(Debug, Clone)]
pub enum Step {
    Ok,
    Fail,
    Hang,
    Delay(Duration),
}

impl Step {
    async fn run(&self, what: &str) -> BrowserResult<()> {
        match self {
            Step::Ok => Ok(()),
            Step::Fail => Err(BrowserError::NavigationFailed(format!("{what} failed"))),
            Step::Hang => std::future::pending().await,
            Step::Delay(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum ContentStep {
    Html(String),
    Throw,
    Hang,
}

/// Answers to the extraction scripts
#[derive(Debug, Clone)]
pub struct MockDom {
    pub title: String,
    pub meta: Value,
    pub language: Value,
    pub headings: [Value; 6],
    pub body: Value,
    pub article: Value,
    pub links: Value,
    /// Scripts that throw instead of answering
    pub failing_scripts: Vec<String>,
    /// Title and script queries never answer
    pub hang_queries: bool,
}

impl Default for MockDom {
    fn default() -> Self {
        Self {
            title: "Example Domain".to_string(),
            meta: json!([]),
            language: Value::Null,
            headings: Default::default(),
            body: json!(""),
            article: Value::Null,
            links: json!([]),
            failing_scripts: Vec::new(),
            hang_queries: false,
        }
    }
}

/// How pages opened on one browser behave
#[derive(Debug, Clone)]
pub struct PageBehavior {
    pub dynamic_navigation: Step,
    pub static_navigation: Step,
    pub content: ContentStep,
    /// A network response is observed as soon as navigation starts
    pub responds: bool,
    pub dom: MockDom,
}

impl Default for PageBehavior {
    fn default() -> Self {
        Self {
            dynamic_navigation: Step::Ok,
            static_navigation: Step::Ok,
            content: ContentStep::Html("<html><body>ok</body></html>".to_string()),
            responds: true,
            dom: MockDom::default(),
        }
    }
}

pub struct MockPage {
    behavior: PageBehavior,
    has_response: AtomicBool,
    pub closed: AtomicBool,
    pub blocked: Mutex<Vec<ResourceKind>>,
    pub navigations: Mutex<Vec<LoadStrategy>>,
    browser: Arc<MockBrowser>,
}

#[async_trait]
impl PageSession for MockPage {
    async fn block_resources(&self, kinds: &[ResourceKind]) -> BrowserResult<()> {
        self.blocked.lock().extend_from_slice(kinds);
        Ok(())
    }

    fn has_response(&self) -> bool {
        self.has_response.load(Ordering::SeqCst)
    }

    async fn goto(&self, _url: &str, strategy: LoadStrategy, _timeout: Duration) -> BrowserResult<()> {
        self.navigations.lock().push(strategy);
        if self.behavior.responds {
            self.has_response.store(true, Ordering::SeqCst);
        }
        match strategy {
            LoadStrategy::DynamicWait => self.behavior.dynamic_navigation.run("dynamic").await,
            LoadStrategy::StaticWait => self.behavior.static_navigation.run("static").await,
        }
    }

    async fn content(&self) -> BrowserResult<String> {
        match &self.behavior.content {
            ContentStep::Html(html) => Ok(html.clone()),
            ContentStep::Throw => Err(BrowserError::EvaluationFailed(
                "Target closed: browser process gone".to_string(),
            )),
            ContentStep::Hang => std::future::pending().await,
        }
    }

    async fn title(&self) -> BrowserResult<String> {
        if self.behavior.dom.hang_queries {
            return std::future::pending().await;
        }
        Ok(self.behavior.dom.title.clone())
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<Value> {
        let dom = &self.behavior.dom;
        if dom.hang_queries {
            return std::future::pending().await;
        }
        if dom.failing_scripts.iter().any(|s| s == script) {
            return Err(BrowserError::EvaluationFailed("Execution context was destroyed".into()));
        }

        if script == META_TAGS_SCRIPT {
            return Ok(dom.meta.clone());
        }
        if script == LANGUAGE_SCRIPT {
            return Ok(dom.language.clone());
        }
        if script == BODY_TEXT_SCRIPT {
            return Ok(dom.body.clone());
        }
        if script == ARTICLE_SCRIPT {
            return Ok(dom.article.clone());
        }
        if script == LINKS_SCRIPT {
            return Ok(dom.links.clone());
        }
        for level in 1..=6u8 {
            if script == headings_script(level) {
                let answer = &dom.headings[usize::from(level - 1)];
                return Ok(if answer.is_null() { json!([]) } else { answer.clone() });
            }
        }
        Err(BrowserError::EvaluationFailed(format!("unexpected script: {script}")))
    }

    async fn close(&self) -> BrowserResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.browser.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct MockBrowser {
    pub index: usize,
    behavior: PageBehavior,
    pub close_calls: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub open_pages: AtomicUsize,
    pub pages: Mutex<Vec<Arc<MockPage>>>,
}

impl MockBrowser {
    pub fn is_closed(&self) -> bool {
        self.close_calls.load(Ordering::SeqCst) > 0
    }

    pub fn last_page(&self) -> Option<Arc<MockPage>> {
        self.pages.lock().last().cloned()
    }
}

struct BrowserRef(Arc<MockBrowser>);

#[async_trait]
impl BrowserInstance for BrowserRef {
    async fn new_page(&self) -> BrowserResult<Arc<dyn PageSession>> {
        if self.0.is_closed() {
            return Err(BrowserError::Closed);
        }
        self.0.pages_opened.fetch_add(1, Ordering::SeqCst);
        self.0.open_pages.fetch_add(1, Ordering::SeqCst);
        let page = Arc::new(MockPage {
            behavior: self.0.behavior.clone(),
            has_response: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            blocked: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
            browser: self.0.clone(),
        });
        self.0.pages.lock().push(page.clone());
        Ok(page)
    }

    async fn close(&self) -> BrowserResult<()> {
        self.0.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine whose n-th launched browser uses the n-th behavior (the last one repeats)
pub struct MockEngine {
    behaviors: Vec<PageBehavior>,
    /// Launches beyond this count fail
    pub launch_limit: Option<usize>,
    pub browsers: Mutex<Vec<Arc<MockBrowser>>>,
}

impl MockEngine {
    pub fn new(behaviors: Vec<PageBehavior>) -> Self {
        Self {
            behaviors,
            launch_limit: None,
            browsers: Mutex::new(Vec::new()),
        }
    }

    pub fn uniform(behavior: PageBehavior) -> Self {
        Self::new(vec![behavior])
    }

    pub fn with_launch_limit(mut self, limit: usize) -> Self {
        self.launch_limit = Some(limit);
        self
    }

    pub fn browser(&self, index: usize) -> Arc<MockBrowser> {
        self.browsers.lock()[index].clone()
    }

    pub fn launched(&self) -> usize {
        self.browsers.lock().len()
    }
}

#[async_trait]
impl BrowserEngine for MockEngine {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserInstance>> {
        let mut browsers = self.browsers.lock();
        let index = browsers.len();
        if self.launch_limit.is_some_and(|limit| index >= limit) {
            return Err(BrowserError::LaunchFailed("resource limit reached".into()));
        }

        let behavior = self
            .behaviors
            .get(index)
            .or_else(|| self.behaviors.last())
            .cloned()
            .unwrap_or_default();
        let browser = Arc::new(MockBrowser {
            index,
            behavior,
            close_calls: AtomicUsize::new(0),
            pages_opened: AtomicUsize::new(0),
            open_pages: AtomicUsize::new(0),
            pages: Mutex::new(Vec::new()),
        });
        browsers.push(browser.clone());
        Ok(Arc::new(BrowserRef(browser)))
    }
}

/// Short timeouts so hanging engines resolve quickly
pub fn fast_fetch_config() -> FetchConfig {
    FetchConfig {
        navigation_timeout_ms: 40,
        navigation_grace_ms: 10,
        content_timeout_ms: 40,
        dynamic_timeout_ms: 40,
        static_timeout_ms: 30,
        extraction_timeout_ms: 40,
        ..FetchConfig::default()
    }
}

pub fn pool_config(grace_ms: u64) -> PoolConfig {
    PoolConfig {
        retire_grace_ms: grace_ms,
    }
}

/// Pool started on `engine` plus a controller with fast timeouts
pub async fn controller_for(
    engine: Arc<MockEngine>,
    grace_ms: u64,
) -> (Arc<BrowserPool>, FetchController) {
    let pool = BrowserPool::start(engine, pool_config(grace_ms))
        .await
        .expect("mock engine launches");
    let controller = FetchController::new(pool.clone(), fast_fetch_config());
    (pool, controller)
}
