use anyhow::Result;

use crate::error::GenerationError;
use crate::logger;
use crate::page::{ElementId, HostPage};
use crate::settings::HostProfile;
use crate::sleep::{sleep_ms, Clock};
use crate::types::{AspectRatio, GenerationMode};

/// Open `dropdown`, click the first option whose text satisfies `matches`.
/// Dismisses the dropdown when nothing matches.
fn pick_option(
    page: &mut dyn HostPage,
    profile: &HostProfile,
    clock: &dyn Clock,
    dropdown: ElementId,
    matches: impl Fn(&str) -> bool,
) -> Result<Option<String>> {
    page.click(dropdown)?;
    sleep_ms(clock, 500);

    let options = page.query_all(&profile.option_selector)?;
    logger::info(&format!("found {} options", options.len()));

    for option in options {
        let text = page.text_content(option)?;
        if matches(&text) {
            page.click(option)?;
            sleep_ms(clock, 300);
            return Ok(Some(text));
        }
    }

    page.dismiss()?;
    Ok(None)
}

/// Select `mode` in the first combobox. Option text may be in any of the
/// profile's labels for that mode (e.g. English or Thai).
pub fn set_mode(page: &mut dyn HostPage, profile: &HostProfile, clock: &dyn Clock, mode: GenerationMode) -> Result<()> {
    let dropdowns = page.query_all(&profile.dropdown_selector)?;
    logger::info(&format!("found {} dropdown buttons", dropdowns.len()));

    let Some(&first) = dropdowns.first() else {
        return Err(GenerationError::ConfigurationNotFound { what: "mode dropdown".into() }.into());
    };

    let labels: Vec<String> = profile.mode_labels(mode).iter().map(|l| l.to_lowercase()).collect();
    let picked = pick_option(page, profile, clock, first, |text| {
        let text = text.to_lowercase();
        labels.iter().any(|l| text.contains(l.as_str()))
    })?;

    match picked {
        Some(_) => {
            logger::success(&format!("mode set to: {}", mode));
            Ok(())
        }
        None => Err(GenerationError::ConfigurationNotFound { what: format!("mode option \"{}\"", mode) }.into()),
    }
}

fn shows_ratio(text: &str) -> bool {
    AspectRatio::KNOWN.iter().any(|r| text.contains(r))
}

/// Find the control that opens the ratio menu.
fn ratio_dropdown(page: &mut dyn HostPage, profile: &HostProfile) -> Result<Option<ElementId>> {
    let dropdowns = page.query_all(&profile.dropdown_selector)?;
    logger::info(&format!("found {} dropdowns for aspect ratio", dropdowns.len()));

    match dropdowns.as_slice() {
        [_, second, ..] => return Ok(Some(*second)),
        [only] => {
            if page.text_content(*only)?.contains(':') {
                return Ok(Some(*only));
            }
        }
        [] => {}
    }

    for button in page.query_all("button")? {
        if shows_ratio(&page.text_content(button)?) {
            return Ok(Some(button));
        }
    }
    Ok(None)
}

/// Select `ratio`. Only meaningful in image mode.
pub fn set_aspect_ratio(
    page: &mut dyn HostPage,
    profile: &HostProfile,
    clock: &dyn Clock,
    ratio: &AspectRatio,
) -> Result<()> {
    // The mode switch may re-render the toolbar
    sleep_ms(clock, 500);

    let Some(dropdown) = ratio_dropdown(page, profile)? else {
        return Err(GenerationError::ConfigurationNotFound { what: "aspect ratio dropdown".into() }.into());
    };

    match pick_option(page, profile, clock, dropdown, |text| text.contains(ratio.as_str()))? {
        Some(_) => {
            logger::success(&format!("aspect ratio set to: {}", ratio));
            Ok(())
        }
        None => Err(GenerationError::ConfigurationNotFound { what: format!("aspect ratio \"{}\"", ratio) }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::stub::{StubDom, StubPage};
    use crate::sleep::ManualClock;

    fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<GenerationError>(), Some(GenerationError::ConfigurationNotFound { .. }))
    }

    #[test]
    fn test_mode_matches_thai_label() {
        let mut dom = StubDom::default();
        dom.add_dropdown("รูปภาพ", &["รูปภาพ", "วิดีโอ"]);
        let mut page = StubPage::new(dom);
        set_mode(&mut page, &HostProfile::default(), &ManualClock::new(), GenerationMode::Video).unwrap();
        assert_eq!(page.dom().selected_options, vec!["วิดีโอ".to_string()]);
    }

    #[test]
    fn test_missing_mode_option_dismisses() {
        let mut dom = StubDom::default();
        dom.add_dropdown("Model", &["Fast", "Quality"]);
        let mut page = StubPage::new(dom);
        let err = set_mode(&mut page, &HostProfile::default(), &ManualClock::new(), GenerationMode::Image).unwrap_err();
        assert!(is_not_found(&err));
        assert_eq!(page.dom().dismissals, 1);
    }

    #[test]
    fn test_no_dropdowns() {
        let mut page = StubPage::new(StubDom::default());
        let clock = ManualClock::new();
        let profile = HostProfile::default();
        assert!(is_not_found(&set_mode(&mut page, &profile, &clock, GenerationMode::Image).unwrap_err()));
        assert!(is_not_found(&set_aspect_ratio(&mut page, &profile, &clock, &AspectRatio::new("1:1")).unwrap_err()));
    }

    #[test]
    fn test_ratio_uses_second_dropdown() {
        let mut dom = StubDom::default();
        dom.add_dropdown("Image", &["Image", "Video"]);
        let ratio = dom.add_dropdown("9:16", &["9:16", "1:1", "16:9"]);
        let mut page = StubPage::new(dom);
        set_aspect_ratio(&mut page, &HostProfile::default(), &ManualClock::new(), &AspectRatio::new("1:1")).unwrap();
        assert_eq!(page.text_content(ratio).unwrap(), "1:1");
    }

    #[test]
    fn test_single_dropdown_showing_ratio() {
        let mut dom = StubDom::default();
        let only = dom.add_dropdown("16:9", &["9:16", "1:1", "16:9"]);
        let mut page = StubPage::new(dom);
        set_aspect_ratio(&mut page, &HostProfile::default(), &ManualClock::new(), &AspectRatio::new("9:16")).unwrap();
        assert_eq!(page.text_content(only).unwrap(), "9:16");
    }
}
