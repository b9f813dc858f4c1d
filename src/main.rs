use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use marquee::catalog::{CatalogClient, CategoryOutcome, MovieSummary, SearchController, SearchOutcome};
use marquee::config::{Config, ID_TOKEN_ENV};
use marquee::favorites::{
    FavoritesStore, MemoryFavoritesStore, RestFavoritesStore, SortOrder, StoreError,
    ToggleOutcome,
};
use marquee::util::{build_client, strip_control_chars, truncate_to_width};
use marquee::view::{HomeView, MovieDetailView, ViewContext, ViewError};
use marquee::Session;
use std::path::PathBuf;
use std::sync::Arc;

/// Get the config directory path (~/.config/marquee/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("marquee"))
}

#[derive(Parser, Debug)]
#[command(
    name = "marquee",
    version,
    about = "Movie catalog browser with favorites synced across devices"
)]
struct Args {
    /// Config file (defaults to ~/.config/marquee/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// User id for favorites. With a remote store the ID token is read from
    /// MARQUEE_ID_TOKEN.
    #[arg(long, value_name = "ID", global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every configured category
    Browse {
        /// Show all results for this category instead of the preview
        #[arg(long, value_name = "LABEL")]
        expand: Vec<String>,
    },
    /// Search the catalog by title
    Search { query: String },
    /// Show one movie's details
    Show { id: String },
    /// List your favorites
    Favorites {
        /// recent, alphabetical or year
        #[arg(long, default_value_t = SortOrder::Recent)]
        sort: SortOrder,
    },
    /// Add or remove a movie from your favorites
    Toggle { id: String },
}

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.parse().ok())
        .filter(|w: &usize| *w >= 20)
        .unwrap_or(80)
}

/// Catalog and store text is untrusted; strip escapes before printing.
fn clean(text: &str, width: usize) -> String {
    truncate_to_width(&strip_control_chars(text), width).into_owned()
}

fn movie_line(movie: &MovieSummary, width: usize) -> String {
    let line = format!("{:<10} {} ({})", movie.id, movie.title, movie.year);
    clean(&line, width)
}

/// Without `store_url` favorites live in a per-process memory store, so a
/// write would be gone before the next invocation could read it.
fn check_favorites_backend(command: &Command, config: &Config) -> Result<()> {
    let needs_store = matches!(command, Command::Favorites { .. } | Command::Toggle { .. });
    if needs_store && config.store_url.is_none() {
        anyhow::bail!(
            "Favorites are not saved without a remote store: set store_url in the config file"
        );
    }
    Ok(())
}

fn build_context(config: &Config, user: Option<&str>) -> Result<ViewContext> {
    let http = build_client().context("Failed to build HTTP client")?;
    let api_key = config
        .api_key()
        .context("No catalog API key: set MARQUEE_API_KEY or api_key in the config file")?;
    let catalog = CatalogClient::new(
        http.clone(),
        config.catalog_endpoint()?,
        api_key,
        config.retry_policy(),
    );

    let (store, session): (Arc<dyn FavoritesStore>, Option<Session>) =
        match config.store_endpoint()? {
            Some(store_url) => {
                let session = match (user, Config::id_token()) {
                    (Some(user), Some(token)) => Some(Session::new(user, token)),
                    (Some(_), None) => {
                        eprintln!("Warning: {ID_TOKEN_ENV} is not set; favorites are unavailable");
                        None
                    }
                    (None, _) => None,
                };
                let store = RestFavoritesStore::new(http, store_url, config.retry_policy());
                (Arc::new(store), session)
            }
            None => {
                tracing::info!("No store_url configured, favorites kept in memory");
                let memory = MemoryFavoritesStore::new();
                let session = user.map(|user| memory.sign_in(user));
                (Arc::new(memory), session)
            }
        };

    Ok(ViewContext {
        source: Arc::new(catalog),
        store,
        session,
        settle_timeout: config.settle_timeout(),
    })
}

async fn browse(ctx: ViewContext, config: &Config, expand: &[String], width: usize) -> Result<()> {
    let mut view = HomeView::mount(ctx, config.categories.clone(), config.max_concurrent_fetches)
        .context("Invalid category configuration")?;
    for label in expand {
        if config.categories.iter().all(|c| &c.label != label) {
            eprintln!("Warning: no category named '{}'", clean(label, width));
        }
        view.toggle_expanded(label);
    }

    let state = view.loaded().await;
    for result in state.results() {
        println!("== {} ==", clean(&result.label, width.saturating_sub(6)));
        let items = view.visible_items(&result.label);
        if items.is_empty() {
            if let CategoryOutcome::Failed(reason) = &result.outcome {
                tracing::debug!(category = %result.label, reason = %reason, "Rendering failed category as empty");
            }
            println!("  No movies found");
        }
        for movie in &items {
            println!("  {}", movie_line(movie, width.saturating_sub(2)));
        }
        let hidden = view.hidden_count(&result.label);
        if hidden > 0 {
            println!("  ... {hidden} more (--expand \"{}\")", clean(&result.label, 40));
        }
        println!();
    }
    Ok(())
}

async fn search(ctx: ViewContext, query: &str, width: usize) -> Result<()> {
    let controller = SearchController::new(Arc::clone(&ctx.source));
    let outcome = controller.submit(query).await;
    let state = controller.state();

    match outcome {
        Some(SearchOutcome::Loaded) => {
            for movie in &state.results {
                println!("{}", movie_line(movie, width));
            }
        }
        Some(SearchOutcome::Failed(reason)) => {
            eprintln!("Search failed: {}", clean(&reason, width));
            println!("No movies found");
        }
        _ => println!("No movies found"),
    }
    Ok(())
}

async fn show(ctx: ViewContext, id: &str, width: usize) -> Result<()> {
    let view = match MovieDetailView::load(&ctx, id).await {
        Ok(view) => view,
        Err(e) if e.is_not_found() => anyhow::bail!("Movie not found: {}", clean(id, 40)),
        Err(e) => return Err(e).context("Failed to load movie"),
    };
    let detail = view.detail();

    println!("{}", clean(&format!("{} ({})", detail.title, detail.year), width));
    let field = |name: &str, value: Option<&str>| {
        if let Some(value) = value {
            println!("{}", clean(&format!("{name:<10} {value}"), width));
        }
    };
    let genres = detail.genres().join(", ");
    field("Genre", (!genres.is_empty()).then_some(genres.as_str()));
    field("Runtime", detail.runtime());
    field("Director", detail.director());
    field("Actors", detail.actors());
    field("IMDb", detail.imdb_rating());
    for rating in &detail.ratings {
        field(&rating.source, Some(rating.value.as_str()));
    }
    if let Some(plot) = detail.plot() {
        println!();
        println!("{}", strip_control_chars(plot));
    }

    if ctx.session.is_some() {
        let favorite = view.favorite().ready().await.unwrap_or(false);
        println!();
        println!("{}", if favorite { "* In your favorites" } else { "Not in your favorites" });
    }
    Ok(())
}

async fn favorites(ctx: ViewContext, sort: SortOrder, width: usize) -> Result<()> {
    if ctx.session.is_none() {
        anyhow::bail!("Sign in required: pass --user <ID>");
    }
    let list = ctx.favorites().await.context("Failed to open favorites")?;
    let state = list.ready().await.context("Favorites subscription closed")?;

    if state.is_empty() {
        println!("No favorites yet");
        return Ok(());
    }
    let stats = state.stats();
    println!(
        "{} movies, {} different years, {} recent",
        stats.total, stats.distinct_years, stats.recent
    );
    for (idx, record) in state.sorted(sort).iter().enumerate() {
        let line = format!("{:>3}. {}", idx + 1, movie_line(&record.to_summary(), width));
        println!("{}", clean(&line, width));
    }
    Ok(())
}

async fn toggle(ctx: ViewContext, id: &str) -> Result<()> {
    let view = match MovieDetailView::load(&ctx, id).await {
        Ok(view) => view,
        Err(e) if e.is_not_found() => anyhow::bail!("Movie not found: {}", clean(id, 40)),
        Err(ViewError::Store(StoreError::AuthRequired)) => {
            anyhow::bail!("Sign in required: pass --user <ID>")
        }
        Err(e) => return Err(e).context("Failed to load movie"),
    };
    if ctx.session.is_some() {
        view.favorite()
            .ready()
            .await
            .context("Favorite status unavailable")?;
    }

    let title = clean(&view.detail().title, 60);
    match view.toggle_favorite().await {
        Ok(ToggleOutcome::Added) => println!("Added {title} to favorites"),
        Ok(ToggleOutcome::Removed) => println!("Removed {title} from favorites"),
        Ok(ToggleOutcome::InFlight | ToggleOutcome::NotReady) => {
            println!("Favorite status is still updating, try again")
        }
        Err(StoreError::AuthRequired) => anyhow::bail!("Sign in required: pass --user <ID>"),
        Err(e) => return Err(e).context("Failed to update favorites"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(?config, "Effective configuration");
    check_favorites_backend(&args.command, &config)?;

    let ctx = build_context(&config, args.user.as_deref())?;
    let width = terminal_width();

    match &args.command {
        Command::Browse { expand } => browse(ctx, &config, expand, width).await,
        Command::Search { query } => search(ctx, query, width).await,
        Command::Show { id } => show(ctx, id, width).await,
        Command::Favorites { sort } => favorites(ctx, *sort, width).await,
        Command::Toggle { id } => toggle(ctx, id).await,
    }
}
