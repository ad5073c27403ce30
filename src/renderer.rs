//! Headless browser rendering, used when a plain HTTP fetch is not enough.
//!
//! The browser is an explicit owned resource: a [`RenderHandle`] launches it
//! lazily on first use, shares it for the rest of the run, and remembers a
//! failed launch so it is never retried.

use anyhow::{Context, bail};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};

/// Launches a browser engine.
#[async_trait]
pub(crate) trait RendererFactory: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Arc<dyn Renderer>>;
}

/// A running browser engine able to open pages.
#[async_trait]
pub(crate) trait Renderer: Send + Sync {
    async fn new_page(&self) -> anyhow::Result<Box<dyn RenderPage>>;
}

/// A single page (tab).
#[async_trait]
pub(crate) trait RenderPage: Send + Sync {
    /// Navigates and waits for the document to be ready.
    async fn navigate(&mut self, url: &str, deadline: Duration) -> anyhow::Result<()>;
    /// Serialized markup of the rendered DOM.
    async fn content(&self) -> anyhow::Result<String>;
    async fn url(&self) -> anyhow::Result<Option<String>>;
    async fn title(&self) -> anyhow::Result<Option<String>>;
    /// PNG screenshot of the visible viewport.
    async fn screenshot(&self) -> anyhow::Result<Vec<u8>>;
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Markup and metadata read from a rendered page.
#[derive(Debug, Clone)]
pub(crate) struct RenderedPage {
    pub final_url: Option<String>,
    pub title: Option<String>,
    pub html: String,
    pub screenshot: Option<Vec<u8>>,
}

enum RenderState {
    Idle,
    Ready(Arc<dyn Renderer>),
    Unavailable,
}

/// Owner of the run-wide shared browser.
pub(crate) struct RenderHandle {
    factory: Option<Box<dyn RendererFactory>>,
    state: Mutex<RenderState>,
}

impl RenderHandle {
    pub(crate) fn new(factory: Box<dyn RendererFactory>) -> Self {
        Self {
            factory: Some(factory),
            state: Mutex::new(RenderState::Idle),
        }
    }

    /// A handle that never renders.
    pub(crate) fn disabled() -> Self {
        Self {
            factory: None,
            state: Mutex::new(RenderState::Unavailable),
        }
    }

    /// Returns the shared renderer, launching it on first call.
    ///
    /// The lock is held across the launch so concurrent callers wait for a
    /// single attempt. A failed launch leaves the handle unavailable for good.
    async fn renderer(&self) -> Result<Arc<dyn Renderer>> {
        let mut state = self.state.lock().await;
        match &*state {
            RenderState::Ready(renderer) => return Ok(Arc::clone(renderer)),
            RenderState::Unavailable => {
                return Err(AppError::RenderingUnavailable(
                    "browser is disabled or failed to launch".to_string(),
                ));
            }
            RenderState::Idle => {}
        }

        let Some(factory) = &self.factory else {
            *state = RenderState::Unavailable;
            return Err(AppError::RenderingUnavailable("no browser configured".to_string()));
        };

        match factory.launch().await {
            Ok(renderer) => {
                tracing::info!(target: "render_task", "Headless browser launched");
                *state = RenderState::Ready(Arc::clone(&renderer));
                Ok(renderer)
            }
            Err(e) => {
                tracing::warn!(target: "render_task",
                    "Headless browser unavailable for the rest of this run: {:#}", e
                );
                *state = RenderState::Unavailable;
                Err(AppError::RenderingUnavailable(e.to_string()))
            }
        }
    }

    /// Renders `url` in a fresh page, closing the page afterwards.
    pub(crate) async fn render(
        &self,
        url: &str,
        deadline: Duration,
        with_screenshot: bool,
    ) -> Result<RenderedPage> {
        let renderer = self.renderer().await?;
        let mut page = renderer
            .new_page()
            .await
            .map_err(|e| AppError::RenderingUnavailable(format!("cannot open page: {}", e)))?;

        let outcome = tokio::time::timeout(
            deadline,
            read_page(page.as_mut(), url, deadline, with_screenshot),
        )
        .await;

        if let Err(e) = page.close().await {
            tracing::debug!(target: "render_task", "Failed to close page for {}: {}", url, e);
        }

        match outcome {
            Ok(Ok(rendered)) => Ok(rendered),
            Ok(Err(e)) => Err(AppError::RenderingUnavailable(format!("{}: {:#}", url, e))),
            Err(_) => Err(AppError::NetworkFailure(format!(
                "render of {} timed out after {:?}",
                url, deadline
            ))),
        }
    }
}

async fn read_page(
    page: &mut dyn RenderPage,
    url: &str,
    deadline: Duration,
    with_screenshot: bool,
) -> anyhow::Result<RenderedPage> {
    page.navigate(url, deadline).await?;
    let html = page.content().await?;
    let final_url = page.url().await.unwrap_or(None);
    let title = page.title().await.unwrap_or(None);
    let screenshot = if with_screenshot {
        page.screenshot().await.ok()
    } else {
        None
    };
    Ok(RenderedPage {
        final_url,
        title,
        html,
        screenshot,
    })
}

/// Launches headless Chromium through chromiumoxide.
pub(crate) struct ChromiumFactory {
    executable: Option<PathBuf>,
}

impl ChromiumFactory {
    pub(crate) fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl RendererFactory for ChromiumFactory {
    async fn launch(&self) -> anyhow::Result<Arc<dyn Renderer>> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .window_size(1366, 900);
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Arc::new(ChromiumRenderer { browser }))
    }
}

struct ChromiumRenderer {
    browser: Browser,
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_page(&self) -> anyhow::Result<Box<dyn RenderPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        Ok(Box::new(ChromiumPage { page }))
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl RenderPage for ChromiumPage {
    async fn navigate(&mut self, url: &str, deadline: Duration) -> anyhow::Result<()> {
        match tokio::time::timeout(deadline, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {deadline:?}"),
        }
    }

    async fn content(&self) -> anyhow::Result<String> {
        self.page.content().await.context("failed to read rendered HTML")
    }

    async fn url(&self) -> anyhow::Result<Option<String>> {
        Ok(self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string()))
    }

    async fn title(&self) -> anyhow::Result<Option<String>> {
        self.page.get_title().await.context("failed to get title")
    }

    async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(false).build())
            .await
            .context("failed to capture screenshot")
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.page.close().await.context("failed to close page")
    }
}
