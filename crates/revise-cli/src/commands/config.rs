use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            request_timeout_secs,
            sync_interval_secs,
            no_activate,
        } => {
            let mut config = CliProfilesConfig::load()?;
            let profile_name = apply_profile_update(
                &mut config,
                profile.as_deref().or(global_profile),
                ProfileUpdate {
                    api_base_url,
                    request_timeout_secs,
                    sync_interval_secs,
                },
                !no_activate,
            )?;
            let path = config.save()?;
            println!(
                "Profile '{}' initialized at {}",
                profile_name,
                path.display()
            );
            Ok(())
        }
        ConfigCommands::Show { profile } => {
            let config = CliProfilesConfig::load()?;
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let resolved = config
                .profile(&profile_name)
                .cloned()
                .unwrap_or_default()
                .client_config()?;
            println!("Profile: {profile_name}");
            println!("{}", serde_json::to_string_pretty(&resolved)?);
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub sync_interval_secs: Option<u64>,
}

/// Merge explicit values into the named profile and validate the result.
/// The config is left untouched when validation fails.
pub fn apply_profile_update(
    config: &mut CliProfilesConfig,
    profile_name: Option<&str>,
    update: ProfileUpdate,
    activate: bool,
) -> Result<String, CliError> {
    let profile_name = config.resolve_profile_name(profile_name);
    let mut profile: CliProfile = config.profile(&profile_name).cloned().unwrap_or_default();
    if let Some(url) = update.api_base_url {
        profile.api_base_url = Some(url);
    }
    if let Some(timeout) = update.request_timeout_secs {
        profile.request_timeout_secs = Some(timeout);
    }
    if let Some(interval) = update.sync_interval_secs {
        profile.sync_interval_secs = Some(interval);
    }

    let validated = profile.client_config_with_env(None)?;
    profile.api_base_url = Some(validated.api_base_url);

    *config.profile_mut_or_default(&profile_name) = profile;
    if activate {
        config.active_profile = Some(profile_name.clone());
    }
    Ok(profile_name)
}
