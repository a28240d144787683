use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bond_outputs::{
    Error, FragmentSource, OutputUpdate, PageLocation, Result, Runtime, SiteConfig, StaticPage,
    StaticSite, TraceConfig, UpdateOutcome,
};

const PAGE_URL: &str = "https://docs.example/notebooks/demo.html";
const BASE: &str = "https://docs.example/notebooks/demo";
const INDEX_URL: &str = "https://docs.example/notebooks/demo/outputs_index.txt";

const PAGE_HTML: &str = r#"
<main>
  <bond def="a"><input type="range" value="1"></bond>
  <bond def="b"><select><option>2</option><option>3</option></select></bond>
  <bond def="unused"><input value="x"></bond>
  <div id="var-c">c initial</div>
  <div id="var-d">d initial</div>
  <div id="var-e">e initial</div>
</main>
"#;

fn url(path: &str) -> String {
    format!("{BASE}/{path}")
}

fn site() -> StaticSite {
    StaticSite::new()
        .with_file(INDEX_URL, "<!-- written by the site generator -->\nc/$a/$b\nd/$b\n")
        .with_file(&url("c/1/2.html"), r#"<div id="var-c">c=3</div>"#)
        .with_file(&url("c/5/2.html"), r#"<div id="var-c">c=7</div>"#)
        .with_file(&url("c/1/3.html"), r#"<div id="var-c">c=4</div>"#)
        .with_file(&url("d/2.html"), r#"<div id="var-d">d=20</div>"#)
        .with_file(&url("d/3.html"), r#"<div id="var-d">d=30</div>"#)
}

async fn load_with(site: StaticSite, config: SiteConfig) -> Result<Runtime<StaticSite, StaticPage>> {
    let page = StaticPage::from_html(PAGE_HTML)?;
    Runtime::load(PageLocation::new(PAGE_URL), config, site, page).await
}

async fn load(site: StaticSite) -> Result<Runtime<StaticSite, StaticPage>> {
    let runtime = load_with(site, SiteConfig::default()).await?;
    runtime.source().take_fetch_calls();
    Ok(runtime)
}

fn text(runtime: &Runtime<StaticSite, StaticPage>, id: &str) -> Option<String> {
    runtime.page().text_content(id)
}

fn applied(output: &str) -> OutputUpdate {
    OutputUpdate {
        output: output.to_string(),
        outcome: UpdateOutcome::Applied,
    }
}

#[tokio::test]
async fn load_parses_index_and_attaches_every_bind_control() -> Result<()> {
    let runtime = load_with(site(), SiteConfig::default()).await?;

    assert_eq!(runtime.source().take_fetch_calls(), vec![INDEX_URL.to_string()]);
    assert_eq!(runtime.index().outputs().collect::<Vec<_>>(), vec!["c", "d"]);
    assert_eq!(runtime.index().get("c"), Some(&["a".to_string(), "b".to_string()][..]));
    assert_eq!(runtime.attached_binds(), &["a", "b", "unused"]);
    assert_eq!(text(&runtime, "var-c").as_deref(), Some("c initial"));
    Ok(())
}

#[tokio::test]
async fn index_fetch_failure_fails_load() {
    let mut site = site();
    site.remove_file(INDEX_URL);

    let result = load_with(site, SiteConfig::default()).await;
    assert_eq!(
        result.err(),
        Some(Error::HttpStatus {
            url: INDEX_URL.to_string(),
            status: 404,
        })
    );
}

#[tokio::test]
async fn change_fetches_the_full_value_tuple() -> Result<()> {
    let runtime = load(site()).await?;

    let updates = runtime.on_bind_change("a").await;
    assert_eq!(updates, vec![applied("c")]);
    assert_eq!(runtime.source().take_fetch_calls(), vec![url("c/1/2.html")]);
    assert_eq!(text(&runtime, "var-c").as_deref(), Some("c=3"));

    let updates = runtime.change_bind_value("a", "5").await?;
    assert_eq!(updates, vec![applied("c")]);
    assert_eq!(runtime.source().take_fetch_calls(), vec![url("c/5/2.html")]);
    assert_eq!(text(&runtime, "var-c").as_deref(), Some("c=7"));
    Ok(())
}

#[tokio::test]
async fn shared_dependency_fetches_each_dependent_once() -> Result<()> {
    let runtime = load(site()).await?;

    let updates = runtime.change_bind_value("b", "3").await?;
    assert_eq!(updates, vec![applied("c"), applied("d")]);

    let mut calls = runtime.source().take_fetch_calls();
    calls.sort();
    assert_eq!(calls, vec![url("c/1/3.html"), url("d/3.html")]);
    assert_eq!(text(&runtime, "var-c").as_deref(), Some("c=4"));
    assert_eq!(text(&runtime, "var-d").as_deref(), Some("d=30"));
    Ok(())
}

#[tokio::test]
async fn unrelated_bind_triggers_no_fetch() -> Result<()> {
    let runtime = load(site()).await?;

    let updates = runtime.change_bind_value("unused", "y").await?;
    assert!(updates.is_empty());
    assert!(runtime.source().take_fetch_calls().is_empty());
    assert_eq!(text(&runtime, "var-c").as_deref(), Some("c initial"));
    Ok(())
}

#[tokio::test]
async fn output_missing_from_index_is_never_refreshed() -> Result<()> {
    let runtime = load(site()).await?;

    runtime.change_bind_value("a", "5").await?;
    runtime.change_bind_value("b", "3").await?;
    runtime.refresh_all().await;

    assert!(
        runtime
            .source()
            .take_fetch_calls()
            .iter()
            .all(|call| !call.starts_with(&url("e")))
    );
    assert_eq!(text(&runtime, "var-e").as_deref(), Some("e initial"));
    Ok(())
}

#[tokio::test]
async fn missing_fragment_keeps_previous_content() -> Result<()> {
    let runtime = load(site()).await?;
    runtime.on_bind_change("a").await;

    let updates = runtime.change_bind_value("a", "8").await?;
    assert_eq!(
        updates,
        vec![OutputUpdate {
            output: "c".into(),
            outcome: UpdateOutcome::Failed(Error::HttpStatus {
                url: url("c/8/2.html"),
                status: 404,
            }),
        }]
    );
    assert_eq!(text(&runtime, "var-c").as_deref(), Some("c=3"));
    Ok(())
}

#[tokio::test]
async fn one_failing_output_does_not_stop_the_others() -> Result<()> {
    let mut site = site();
    site.set_unreachable(&url("c/1/3.html"), "connection reset");
    let runtime = load(site).await?;

    let updates = runtime.change_bind_value("b", "3").await?;
    assert_eq!(
        updates[0].outcome,
        UpdateOutcome::Failed(Error::Fetch {
            url: url("c/1/3.html"),
            reason: "connection reset".into(),
        })
    );
    assert_eq!(updates[1], applied("d"));
    assert_eq!(text(&runtime, "var-c").as_deref(), Some("c initial"));
    assert_eq!(text(&runtime, "var-d").as_deref(), Some("d=30"));
    Ok(())
}

#[tokio::test]
async fn dependency_without_control_fails_without_fetching() -> Result<()> {
    let site = site().with_file(INDEX_URL, "c/$a/$b\nf/$a/$ghost\n");
    let runtime = load(site).await?;

    let updates = runtime.on_bind_change("a").await;
    assert_eq!(updates[0], applied("c"));
    assert_eq!(
        updates[1].outcome,
        UpdateOutcome::Failed(Error::UnboundVariable {
            output: "f".into(),
            bind: "ghost".into(),
        })
    );
    assert_eq!(runtime.source().take_fetch_calls(), vec![url("c/1/2.html")]);
    Ok(())
}

#[tokio::test]
async fn missing_placeholder_is_reported() -> Result<()> {
    let site = site()
        .with_file(INDEX_URL, "g/$a\n")
        .with_file(&url("g/1.html"), "<p>g</p>");
    let runtime = load(site).await?;

    let updates = runtime.on_bind_change("a").await;
    assert_eq!(
        updates[0].outcome,
        UpdateOutcome::Failed(Error::PlaceholderNotFound("var-g".into()))
    );
    Ok(())
}

#[tokio::test]
async fn fragment_without_placeholder_id_ends_later_updates() -> Result<()> {
    let site = site().with_file(&url("c/1/2.html"), "<p>bare</p>");
    let runtime = load(site).await?;

    assert_eq!(runtime.on_bind_change("a").await, vec![applied("c")]);
    assert!(!runtime.page().contains_id("var-c"));

    let updates = runtime.change_bind_value("a", "5").await?;
    assert_eq!(
        updates[0].outcome,
        UpdateOutcome::Failed(Error::PlaceholderNotFound("var-c".into()))
    );
    Ok(())
}

#[tokio::test]
async fn refresh_all_updates_every_indexed_output() -> Result<()> {
    let runtime = load(site()).await?;

    let updates = runtime.refresh_all().await;
    assert_eq!(updates, vec![applied("c"), applied("d")]);
    assert_eq!(text(&runtime, "var-c").as_deref(), Some("c=3"));
    assert_eq!(text(&runtime, "var-d").as_deref(), Some("d=20"));
    Ok(())
}

#[tokio::test]
async fn prefetch_runs_with_index_load_and_tolerates_failures() -> Result<()> {
    let config = SiteConfig::default()
        .with_prefetch("c", &["1", "2"])
        .with_prefetch("c", &["9", "9"]);
    let runtime = load_with(site(), config).await?;

    let mut calls = runtime.source().take_fetch_calls();
    calls.sort();
    assert_eq!(calls, vec![url("c/1/2.html"), url("c/9/9.html"), INDEX_URL.to_string()]);
    assert_eq!(text(&runtime, "var-c").as_deref(), Some("c initial"));
    Ok(())
}

#[tokio::test]
async fn custom_markup_and_layout() -> Result<()> {
    let html = r#"<widget name="n"><input value="4"></widget><section id="out-sq">?</section>"#;
    let site = StaticSite::new()
        .with_file("https://docs.example/notebooks/demo/deps.txt", "sq/@n\n")
        .with_file(
            "https://docs.example/notebooks/demo/sq/4.htm",
            r#"<section id="out-sq">16</section>"#,
        );
    let config = SiteConfig::default()
        .with_index_path("deps.txt")
        .with_placeholder_prefix("out-")
        .with_bind_markup("WIDGET", "name")
        .with_variable_sigil("@")
        .with_fragment_extension(".htm");
    let runtime = Runtime::load(
        PageLocation::new(PAGE_URL),
        config,
        site,
        StaticPage::from_html(html)?,
    )
    .await?;

    assert_eq!(runtime.on_bind_change("n").await, vec![applied("sq")]);
    assert_eq!(runtime.page().text_content("out-sq").as_deref(), Some("16"));
    Ok(())
}

#[tokio::test]
async fn trace_records_index_fetch_and_change_lines() -> Result<()> {
    let config = SiteConfig::default().with_trace(TraceConfig::quiet());
    let runtime = load_with(site(), config).await?;
    runtime.change_bind_value("a", "5").await?;

    let logs = runtime.take_trace_logs();
    assert!(logs.contains(&format!("[index] loaded outputs=2 from {INDEX_URL}")));
    assert!(logs.contains(&"[change] handlers attached for [a,b,unused]".to_string()));
    assert!(logs.contains(&"[change] received a".to_string()));
    assert!(logs.contains(&"[change] a affects [c]".to_string()));
    assert!(logs.contains(&format!("[fetch] GET {}", url("c/5/2.html"))));
    assert!(logs.contains(&"[change] c applied generation=1".to_string()));
    assert!(runtime.take_trace_logs().is_empty());

    runtime.set_trace_fetches(false);
    runtime.change_bind_value("a", "1").await?;
    let logs = runtime.take_trace_logs();
    assert!(logs.iter().all(|line| !line.starts_with("[fetch]")));
    assert!(logs.contains(&"[change] c applied generation=2".to_string()));
    Ok(())
}

/// Delays chosen URLs by a number of executor polls before serving them.
struct SlowSite {
    inner: StaticSite,
    slow_url: String,
    polls: u32,
}

impl FragmentSource for SlowSite {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        if url == self.slow_url {
            Yield(self.polls).await;
        }
        self.inner.fetch_text(url).await
    }
}

struct Yield(u32);

impl Future for Yield {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 == 0 {
            return Poll::Ready(());
        }
        self.0 -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

async fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
    std::future::poll_fn(|cx| Poll::Ready(Pin::new(&mut *future).poll(cx))).await
}

#[tokio::test]
async fn late_response_for_stale_values_is_discarded() -> Result<()> {
    let slow = SlowSite {
        inner: site(),
        slow_url: url("c/1/2.html"),
        polls: 3,
    };
    let runtime = Runtime::load(
        PageLocation::new(PAGE_URL),
        SiteConfig::default(),
        slow,
        StaticPage::from_html(PAGE_HTML)?,
    )
    .await?;

    let mut stale = Box::pin(runtime.on_bind_change("a"));
    assert!(poll_once(&mut stale).await.is_pending());

    runtime.page().set_control_value(runtime.config(), "a", "5")?;
    assert_eq!(runtime.on_bind_change("a").await, vec![applied("c")]);
    assert_eq!(runtime.page().text_content("var-c").as_deref(), Some("c=7"));

    assert_eq!(
        stale.await,
        vec![OutputUpdate {
            output: "c".into(),
            outcome: UpdateOutcome::Superseded,
        }]
    );
    assert_eq!(runtime.page().text_content("var-c").as_deref(), Some("c=7"));
    Ok(())
}
