use super::Context;
use anyhow::{Context as _, Result};
use scena_core::roster::HumanRoster;

/// Stores the roster in `config.toml` and reports which loaded avatars it
/// covers.
pub async fn set(context: &Context, names: Vec<String>) -> Result<()> {
    let mut config = context.config_service.get_config()?;
    config.human_roster = names.clone();
    context
        .config_service
        .save(&config)
        .context("Failed to save config.toml")?;

    context.usecase.set_human_roster(HumanRoster::new(names)).await;

    let mut humans = 0;
    for scene in context.usecase.scenes().await {
        humans += scene
            .avatar_elements()
            .filter_map(|(_, e)| e.avatar_data())
            .filter(|a| a.is_human)
            .count();
    }
    println!("Roster saved; {} avatars are played by humans", humans);
    Ok(())
}
