use std::sync::Arc;

use anyhow::Context as _;
use url::Url;

use crate::cli::{BrowseArgs, NormalizeArgs};
use crate::config::EngineConfig;
use crate::download::{DownloadRouter, UserAgentPlatform};
use crate::fetch::HttpFeedFetcher;
use crate::formats::{BookFormat, CatalogLocation, LinkKind};
use crate::link::LinkNormalizer;
use crate::session::NavigatorSession;
use crate::view::{self, PageView};

pub async fn run(args: BrowseArgs) -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("load engine config")?;
    let proxy = Url::parse(&args.proxy).context("parse --proxy")?;
    let fetcher = HttpFeedFetcher::new(proxy, config.fetch_timeout).context("build fetcher")?;
    let router = DownloadRouter::new(UserAgentPlatform::new(
        args.user_agent.clone().unwrap_or_default(),
        args.standalone,
    ));

    let mut session = NavigatorSession::new(config, Arc::new(fetcher), router);

    if let Some(query) = args.search.as_deref() {
        session
            .search_by_author(query)
            .await
            .context("search by author")?;
    } else {
        let location = session.parser().normalizer().normalize(&args.location);
        if location.is_empty() {
            anyhow::bail!("--location is empty");
        }
        let location = CatalogLocation::new(location);
        let loaded = if location == *session.current() {
            session.load_initial().await
        } else {
            session.open(location).await
        };
        loaded.context("load catalog")?;
    }

    for _ in 1..args.pages {
        if session.pagination().next_href.is_none() {
            break;
        }
        session.load_more().await.context("load next page")?;
    }

    if let Some(index) = args.download {
        activate_download(&mut session, index, args.format.as_deref())?;
    }

    let page = PageView::from_session(&session);
    if args.json {
        let json = serde_json::to_string_pretty(&page).context("serialize page")?;
        println!("{json}");
    } else {
        print!("{}", page.render_text());
    }
    Ok(())
}

fn activate_download(
    session: &mut NavigatorSession,
    index: usize,
    format: Option<&str>,
) -> anyhow::Result<()> {
    let wanted = match format {
        Some(raw) => Some(
            BookFormat::classify(&raw.trim().to_ascii_lowercase())
                .ok_or_else(|| anyhow::anyhow!("unsupported --format: {raw}"))?,
        ),
        None => None,
    };

    let position = index
        .checked_sub(1)
        .ok_or_else(|| anyhow::anyhow!("--download is 1-based; got 0"))?;
    let entry = view::visible_entries(session.feed(), &session.config().hidden_titles)
        .nth(position)
        .ok_or_else(|| anyhow::anyhow!("no visible entry #{index}"))?;
    let link = entry
        .links
        .iter()
        .find(|link| match link.kind() {
            LinkKind::Book(found) => wanted.is_none_or(|wanted| wanted == found),
            _ => false,
        })
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("entry #{index} has no matching format link"))?;

    let action = session.activate_format(&link);
    tracing::info!(action = %view::describe_action(&action), "format link activated");
    Ok(())
}

pub fn normalize(args: NormalizeArgs) -> anyhow::Result<()> {
    let origin = match args.origin.as_deref() {
        Some(raw) => crate::config::parse_origin(raw).context("parse --origin")?,
        None => EngineConfig::from_env().context("load engine config")?.origin,
    };
    let normalizer = LinkNormalizer::new(origin);
    for href in &args.hrefs {
        println!("{}", normalizer.normalize(href));
    }
    Ok(())
}
