use std::path::Path;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use memo_core::models::{BackgroundConfig, FontConfig, ThemeConfig};
use memo_core::store::SaveOutcome;
use memo_core::util::is_http_url;

use crate::cli::SettingsCommands;
use crate::commands::common::{normalize_content, Session};
use crate::error::CliError;

pub fn run_settings(session: &Session, command: SettingsCommands) -> Result<(), CliError> {
    match command {
        SettingsCommands::Show => run_settings_show(session),
        SettingsCommands::Theme { color, dark, light } => {
            let dark_mode = if dark {
                Some(true)
            } else if light {
                Some(false)
            } else {
                None
            };
            run_theme(session, color, dark_mode)
        }
        SettingsCommands::Background {
            url,
            image,
            brightness,
            blur,
            random,
        } => {
            let image_url = match (url, image) {
                (Some(url), _) => Some(normalize_image_url(&url)?),
                (None, Some(path)) => Some(image_data_uri(&path)?),
                (None, None) => None,
            };
            let mut background = session.settings().load_background()?;
            if let Some(image_url) = image_url {
                background.image_url = image_url;
            }
            if let Some(brightness) = brightness {
                background.brightness = brightness;
            }
            if let Some(blur) = blur {
                background.blur = blur;
            }
            if let Some(random) = random {
                background.use_random = random;
            }
            run_background(session, &background)
        }
    }
}

fn run_settings_show(session: &Session) -> Result<(), CliError> {
    let settings = session.settings();
    let theme: ThemeConfig = settings.load()?;
    let font: FontConfig = settings.load()?;
    let background = settings.load_background()?;

    println!(
        "theme       {} ({})",
        theme.theme_color,
        if theme.dark_mode { "dark" } else { "light" }
    );
    println!("font        {} {}px", font.selected_font, font.font_size);
    println!("background  {}", describe_image(&background.image_url));
    println!(
        "            brightness {}, blur {}, random {}",
        background.brightness, background.blur, background.use_random
    );
    Ok(())
}

fn run_theme(
    session: &Session,
    color: Option<String>,
    dark_mode: Option<bool>,
) -> Result<(), CliError> {
    let settings = session.settings();
    let mut theme: ThemeConfig = settings.load()?;
    if let Some(color) = color {
        theme.theme_color = normalize_hex_color(&color)?;
    }
    if let Some(dark_mode) = dark_mode {
        theme.dark_mode = dark_mode;
    }
    settings.save(&theme)?;
    println!(
        "{} ({})",
        theme.theme_color,
        if theme.dark_mode { "dark" } else { "light" }
    );
    Ok(())
}

fn run_background(session: &Session, background: &BackgroundConfig) -> Result<(), CliError> {
    match session.settings().save_background(background)? {
        SaveOutcome::Saved => println!("Background saved"),
        SaveOutcome::Degraded(warning) => println!("warning: {warning}"),
    }
    Ok(())
}

pub fn normalize_hex_color(value: &str) -> Result<String, CliError> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let valid_length = matches!(digits.len(), 3 | 6 | 8);
    if !valid_length || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(CliError::Config(format!("'{value}' is not a hex color")));
    }
    Ok(format!("#{}", digits.to_ascii_uppercase()))
}

fn normalize_image_url(value: &str) -> Result<String, CliError> {
    let Some(url) = normalize_content(value) else {
        return Ok(String::new());
    };
    if is_http_url(&url) || url.starts_with("data:") {
        Ok(url)
    } else {
        Err(CliError::Config(
            "background URL must include http://, https:// or data:".to_string(),
        ))
    }
}

pub fn image_data_uri(path: &Path) -> Result<String, CliError> {
    let bytes = std::fs::read(path)?;
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();
    if mime_type.type_() != mime_guess::mime::IMAGE {
        return Err(CliError::Config(format!(
            "{} is not an image ({})",
            path.display(),
            mime_type.essence_str()
        )));
    }
    Ok(format!(
        "data:{};base64,{}",
        mime_type.essence_str(),
        BASE64_STANDARD.encode(bytes)
    ))
}

pub fn describe_image(image_url: &str) -> String {
    if image_url.is_empty() {
        return "(none)".to_string();
    }
    if let Some(rest) = image_url.strip_prefix("data:") {
        let mime_type = rest.split([';', ',']).next().unwrap_or("unknown");
        return format!("inline {mime_type}, {} chars", image_url.len());
    }
    image_url.to_string()
}
