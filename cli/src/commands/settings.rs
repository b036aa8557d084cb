use anyhow::Result;

use whey_core::config::EngineConfig;
use whey_core::service::WheyService;

pub(crate) fn cmd_settings_show(svc: &WheyService, json: bool) -> Result<()> {
    let config = svc.config()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print_config(&config);
    }
    Ok(())
}

pub(crate) fn cmd_settings_set(svc: &WheyService, key: &str, value: &str, json: bool) -> Result<()> {
    let config = svc.set_setting(key, value)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{key} = {}", value.trim());
    }
    Ok(())
}

pub(crate) fn cmd_settings_reset(svc: &WheyService, key: &str, json: bool) -> Result<()> {
    let config = svc.reset_setting(key)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{key} reset to default");
        print_config(&config);
    }
    Ok(())
}

fn print_config(config: &EngineConfig) {
    println!("alpha            = {}", config.alpha);
    println!("max_rollover     = {}g", config.max_rollover);
    println!("default_target_g = {}g", config.default_target_g);
    println!("target_basis     = {}", config.target_basis.as_str());
    println!("week_start       = {}", config.week_start);
}
