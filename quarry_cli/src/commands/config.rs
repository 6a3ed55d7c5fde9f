use crate::cli::{Cli, ConfigAction};
use crate::commands::{config_store, CommandError, Result};
use crate::output::{to_structured, Painter};
use owo_colors::Style;
use quarry_core::{ConfigStore, SearchConfig};

pub async fn run(cli: &Cli, action: ConfigAction) -> Result<()> {
    let store = config_store(cli);
    match action {
        ConfigAction::Show => show_config(cli, &store),
        ConfigAction::Path => {
            println!("{}", store.path().display());
            Ok(())
        }
        ConfigAction::Init { force } => init_config(cli, &store, force),
    }
}

fn show_config(cli: &Cli, store: &ConfigStore) -> Result<()> {
    let config = store
        .load()
        .map_err(|err| CommandError::InvalidConfig(err.to_string()))?;
    if let Some(text) = to_structured(&config, cli.output)? {
        println!("{text}");
        return Ok(());
    }

    let painter = Painter::new(cli.no_color);
    let source = if store.exists() {
        painter.paint("loaded", Style::new().green())
    } else {
        painter.paint("not found, using defaults", Style::new().yellow())
    };
    println!();
    println!("{}", painter.paint("Quarry Configuration", Style::new().bold().cyan()));
    println!();
    println!("Config file: {} ({source})", store.path().display());
    println!();
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn init_config(cli: &Cli, store: &ConfigStore, force: bool) -> Result<()> {
    if store.exists() && !force {
        return Err(CommandError::InvalidConfig(format!(
            "{} already exists (use --force to overwrite)",
            store.path().display()
        )));
    }
    store.save(&SearchConfig::default())?;
    let painter = Painter::new(cli.no_color);
    println!(
        "{} {}",
        painter.paint("Wrote", Style::new().green().bold()),
        store.path().display()
    );
    Ok(())
}
