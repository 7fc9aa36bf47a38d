use crate::binding::WidgetBindingService;
use crate::cache::ResponseCache;
use crate::error::StoreError;
use crate::fetcher::ProxyFetcher;
use crate::format::FieldFormatter;
use crate::portfolio::Portfolio;
use crate::projection::{project, TableQuery, WidgetState, WidgetView};
use crate::store::DashboardStore;
use crate::widget::{ChartInterval, ChartType, DisplayMode, Theme, WidgetConfig, WidgetField};

use clap::{arg, value_parser, ArgAction, ArgMatches, Command};
use eyre::{bail, eyre, WrapErr};
use futures::future::join_all;
use serde::Deserialize;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod binding;
mod cache;
mod discovery;
mod error;
mod fetcher;
mod format;
mod path;
mod portfolio;
mod projection;
mod refresh;
mod report;
mod schema;
mod store;
mod tui;
mod widget;

const APP_NAME: &str = "findash";
const CONFIG_NAME: &str = "config";

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct Config {
    database_path: String,
    currency: String,
    cache_ttl_secs: u64,
    cache_max_entries: usize,
    request_timeout_secs: u64,
    default_refresh_secs: u64,
    log_file: String,
    portfolio_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: String::new(),
            currency: "INR".to_string(),
            cache_ttl_secs: cache::DEFAULT_TTL.as_secs(),
            cache_max_entries: cache::DEFAULT_MAX_ENTRIES,
            request_timeout_secs: fetcher::DEFAULT_TIMEOUT.as_secs(),
            default_refresh_secs: 30,
            log_file: String::new(),
            portfolio_file: String::new(),
        }
    }
}

impl Config {
    /// sled directory; defaults to `database` next to the config file.
    fn database_path(&self) -> eyre::Result<PathBuf> {
        if !self.database_path.is_empty() {
            return Ok(PathBuf::from(&self.database_path));
        }
        let config_file = confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?;
        Ok(config_file
            .parent()
            .map(|dir| dir.join("database"))
            .unwrap_or_else(|| PathBuf::from("database")))
    }

    fn open_store(&self) -> eyre::Result<DashboardStore> {
        let path = self.database_path()?;
        DashboardStore::open(&path)
            .wrap_err_with(|| format!("failed to open database at {}", path.display()))
    }

    fn binding_service(&self) -> eyre::Result<WidgetBindingService> {
        let fetcher = ProxyFetcher::new(Duration::from_secs(self.request_timeout_secs))?;
        let cache = ResponseCache::new(
            Duration::from_secs(self.cache_ttl_secs),
            self.cache_max_entries,
        );
        Ok(WidgetBindingService::new(Arc::new(fetcher), cache))
    }

    fn formatter(&self) -> FieldFormatter {
        FieldFormatter::new(&self.currency)
    }
}

fn cli() -> Command {
    Command::new("findash_rs")
        .about("A terminal dashboard for arbitrary JSON finance APIs")
        .arg_required_else_help(true)
        .arg(arg!(--currency <CODE> "Currency for currency-formatted fields").global(true))
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(
            Command::new("test")
                .about("Fetch an API once and list the fields it exposes")
                .arg(arg!(<URL> "API endpoint"))
                .arg(arg!(--search <TEXT> "Only fields whose path or label contains TEXT"))
                .arg(arg!(--"arrays-only" "Only array fields")),
        )
        .subcommand(
            Command::new("add")
                .about("Add a widget to the dashboard")
                .arg(arg!(--name <NAME> "Widget name").required(true))
                .arg(arg!(--url <URL> "API endpoint").required(true))
                .arg(
                    arg!(--field <SELECTOR> "Field as PATH[:LABEL[:FORMAT]], repeatable")
                        .action(ArgAction::Append),
                )
                .arg(arg!(--mode <MODE> "card, table or chart").default_value("card"))
                .arg(arg!(--chart <TYPE> "line or candle"))
                .arg(arg!(--interval <INTERVAL> "daily, weekly or monthly"))
                .arg(
                    arg!(--refresh <SECS> "Refresh interval in seconds, 0 disables")
                        .value_parser(value_parser!(u64)),
                )
                .arg(arg!(--description <TEXT> "Widget description")),
        )
        .subcommand(
            Command::new("edit")
                .about("Change a widget's settings")
                .arg(arg!(<ID> "Widget id"))
                .arg(arg!(--name <NAME> "Widget name"))
                .arg(arg!(--mode <MODE> "card, table or chart"))
                .arg(arg!(--chart <TYPE> "line or candle"))
                .arg(arg!(--interval <INTERVAL> "daily, weekly or monthly"))
                .arg(
                    arg!(--refresh <SECS> "Refresh interval in seconds, 0 disables")
                        .value_parser(value_parser!(u64)),
                )
                .arg(arg!(--description <TEXT> "Widget description")),
        )
        .subcommand(Command::new("list").about("List configured widgets"))
        .subcommand(
            Command::new("remove")
                .about("Remove a widget")
                .arg(arg!(<ID> "Widget id")),
        )
        .subcommand(
            Command::new("show")
                .about("Fetch widgets once and print them")
                .arg(arg!([ID] "Only show this widget")),
        )
        .subcommand(
            Command::new("theme")
                .about("Set the dashboard theme")
                .arg(arg!(<THEME> "light or dark").value_parser(["light", "dark"])),
        )
        .subcommand(Command::new("tui").about("Open the interactive dashboard"))
        .subcommand(
            Command::new("portfolio")
                .about("Show holdings, sector totals and overall gain/loss")
                .arg(arg!([FILE] "JSON file with your holdings"))
                .arg(arg!(--sectors "Only print the sector summary")),
        )
}

fn init_logging(cfg: &Config, tui_mode: bool) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if !cfg.log_file.is_empty() {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.log_file)
            .wrap_err_with(|| format!("failed to open log file {}", cfg.log_file))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else if tui_mode {
        // stderr would draw over the dashboard
        builder.with_writer(std::io::sink).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}

fn parse_opt<T: FromStr<Err = String>>(matches: &ArgMatches, id: &str) -> eyre::Result<Option<T>> {
    matches
        .get_one::<String>(id)
        .map(|s| s.parse::<T>().map_err(|e| eyre!(e)))
        .transpose()
}

async fn test_endpoint(cfg: &Config, matches: &ArgMatches) -> eyre::Result<()> {
    let url = matches
        .get_one::<String>("URL")
        .ok_or_else(|| eyre!("missing URL"))?;
    let result = cfg.binding_service()?.test_endpoint(url).await;
    if !result.success {
        bail!(result.error.unwrap_or_default());
    }

    let fields = result.fields.unwrap_or_default();
    let search = matches.get_one::<String>("search").map_or("", String::as_str);
    let visible = schema::filter_fields(&fields, search, matches.get_flag("arrays-only"));
    println!("{}", report::catalog_table(&visible));
    println!("{} of {} fields", visible.len(), fields.len());
    Ok(())
}

async fn add_widget(cfg: &Config, matches: &ArgMatches) -> eyre::Result<()> {
    let name = matches.get_one::<String>("name").map_or("", String::as_str);
    let url = matches.get_one::<String>("url").map_or("", String::as_str);

    let mut fields = matches
        .get_many::<String>("field")
        .into_iter()
        .flatten()
        .map(|s| WidgetField::from_selector(s))
        .collect::<Result<Vec<_>, _>>()?;

    if fields.is_empty() {
        let result = cfg.binding_service()?.test_endpoint(url).await;
        if !result.success {
            bail!(result.error.unwrap_or_default());
        }
        fields = schema::default_selection(&result.fields.unwrap_or_default());
    }

    let mode = parse_opt::<DisplayMode>(matches, "mode")?.unwrap_or_default();
    let mut widget = WidgetConfig::new(name, url, fields, mode);
    widget.refresh_interval = matches
        .get_one::<u64>("refresh")
        .copied()
        .unwrap_or(cfg.default_refresh_secs);
    widget.chart_type = parse_opt::<ChartType>(matches, "chart")?;
    widget.chart_interval = parse_opt::<ChartInterval>(matches, "interval")?;
    widget.description = matches.get_one::<String>("description").cloned();
    widget.validate()?;

    let id = widget.id.clone();
    cfg.open_store()?.add_widget(widget)?;
    println!("Added widget {id}");
    Ok(())
}

fn edit_widget(cfg: &Config, matches: &ArgMatches) -> eyre::Result<()> {
    let id = matches
        .get_one::<String>("ID")
        .ok_or_else(|| eyre!("missing widget id"))?;
    let mode = parse_opt::<DisplayMode>(matches, "mode")?;
    let chart_type = parse_opt::<ChartType>(matches, "chart")?;
    let chart_interval = parse_opt::<ChartInterval>(matches, "interval")?;

    let store = cfg.open_store()?;
    let mut edited = store
        .load()?
        .widget(id)
        .cloned()
        .ok_or_else(|| StoreError::WidgetNotFound(id.clone()))?;
    if let Some(name) = matches.get_one::<String>("name") {
        edited.name.clone_from(name);
    }
    if let Some(mode) = mode {
        edited.display_mode = mode;
    }
    if let Some(secs) = matches.get_one::<u64>("refresh") {
        edited.refresh_interval = *secs;
    }
    if chart_type.is_some() {
        edited.chart_type = chart_type;
    }
    if chart_interval.is_some() {
        edited.chart_interval = chart_interval;
    }
    if let Some(description) = matches.get_one::<String>("description") {
        edited.description = Some(description.clone());
    }
    edited.validate()?;

    let updated = store.update_widget(id, |w| *w = edited)?;
    println!("Updated widget {}", updated.id);
    Ok(())
}

async fn show_widgets(cfg: &Config, matches: &ArgMatches) -> eyre::Result<()> {
    let state = cfg.open_store()?.load()?;
    let widgets = match matches.get_one::<String>("ID") {
        Some(id) => vec![state
            .widget(id)
            .cloned()
            .ok_or_else(|| StoreError::WidgetNotFound(id.clone()))?],
        None => state.widgets,
    };
    if widgets.is_empty() {
        println!("No widgets configured. Add one with `findash_rs add`.");
        return Ok(());
    }

    let binding = cfg.binding_service()?;
    let formatter = cfg.formatter();
    let all_rows = TableQuery {
        per_page: usize::MAX,
        ..Default::default()
    };

    let results = join_all(widgets.iter().map(|w| binding.fetch_widget_data(&w.api_url))).await;
    for (widget, result) in widgets.iter().zip(results) {
        let mut state = WidgetState::loading();
        state.apply(result);
        let view = project(widget, &state, &formatter, &all_rows);

        println!("{} [{}]", widget.name, widget.id);
        if let Some(description) = &widget.description {
            println!("{description}");
        }
        println!("{}", report::view_table(&view));
        if let WidgetView::Table(table) = &view {
            println!("{}", table.summary());
        }
    }
    Ok(())
}

fn show_portfolio(cfg: &Config, matches: &ArgMatches) -> eyre::Result<()> {
    // fall back to the configured file when none is given
    let filename = matches
        .get_one::<String>("FILE")
        .filter(|f| !f.is_empty())
        .unwrap_or(&cfg.portfolio_file);
    if filename.is_empty() {
        bail!("No holdings file given. Pass FILE or set portfolio_file in the config.");
    }

    let portfolio = Portfolio::from_file(Path::new(filename))?;
    let formatter = cfg.formatter();
    if !matches.get_flag("sectors") {
        println!("{}", report::holdings_table(&portfolio, &formatter));
    }
    println!(
        "{}",
        report::sectors_table(&portfolio.sector_summaries(), &formatter)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let mut cfg: Config =
        confy::load(APP_NAME, CONFIG_NAME).wrap_err("failed to load configuration")?;

    let matches = cli().get_matches();

    let currency = matches
        .subcommand()
        .and_then(|(_, sub)| sub.get_one::<String>("currency"))
        .or_else(|| matches.get_one::<String>("currency"));
    if let Some(currency) = currency {
        cfg.currency.clone_from(currency);
    }

    init_logging(&cfg, matches.subcommand_name() == Some("tui"))?;

    match matches.subcommand() {
        Some(("config", _)) => {
            let path = confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?;
            println!("Your config file is located here: \n{}", path.display());
        }
        Some(("test", sub)) => test_endpoint(&cfg, sub).await?,
        Some(("add", sub)) => add_widget(&cfg, sub).await?,
        Some(("edit", sub)) => edit_widget(&cfg, sub)?,
        Some(("list", _)) => {
            let state = cfg.open_store()?.load()?;
            println!("{}", report::widgets_table(&state.widgets));
        }
        Some(("remove", sub)) => {
            let id = sub
                .get_one::<String>("ID")
                .ok_or_else(|| eyre!("missing widget id"))?;
            cfg.open_store()?.remove_widget(id)?;
            println!("Removed widget {id}");
        }
        Some(("show", sub)) => show_widgets(&cfg, sub).await?,
        Some(("theme", sub)) => {
            let theme = parse_opt::<Theme>(sub, "THEME")?.unwrap_or_default();
            cfg.open_store()?.set_theme(theme)?;
            println!("Theme set to {}", theme.as_str());
        }
        Some(("portfolio", sub)) => show_portfolio(&cfg, sub)?,
        Some(("tui", _)) => {
            tui::run_tui(cfg.open_store()?, cfg.binding_service()?, cfg.formatter()).await?
        }
        _ => (),
    }
    Ok(())
}
