use std::time::Duration;

use anyhow::Result;

use crate::error::GenerationError;
use crate::logger;
use crate::page::{gesture_click, EditCommand, ElementId, HostPage, KeyPhase};
use crate::settings::HostProfile;
use crate::sleep::{jittered, sleep_ms, Clock};

/// Residual input shorter than this (in chars) counts as cleared after Enter.
const CLEARED_BELOW: usize = 10;
/// Max vertical distance between the input and an icon button on its row.
const SAME_ROW_PX: f64 = 100.0;
const BACKOFF_BASE: Duration = Duration::from_millis(400);

pub fn locate_input(page: &mut dyn HostPage, profile: &HostProfile) -> Result<ElementId> {
    page.find_first(&profile.prompt_input_selectors)?
        .ok_or_else(|| GenerationError::InputNotFound.into())
}

/// Ways of putting text into the input, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStep {
    /// Native insert-text editing command.
    NativeInsert,
    /// Legacy `textInput` event, only when the native command failed.
    LegacyTextInput,
    /// Assign content, then fire `input`.
    AssignAndInput,
    /// Fire `change`.
    ChangeEvent,
}

pub const INSERT_STEPS: [InsertStep; 4] = [
    InsertStep::NativeInsert,
    InsertStep::LegacyTextInput,
    InsertStep::AssignAndInput,
    InsertStep::ChangeEvent,
];

impl InsertStep {
    fn apply(self, page: &mut dyn HostPage, input: ElementId, text: &str, inserted: &mut bool) -> Result<()> {
        match self {
            InsertStep::NativeInsert => {
                *inserted = page.exec_command(&EditCommand::InsertText(text.to_string()))?;
            }
            InsertStep::LegacyTextInput => {
                if !*inserted {
                    page.dispatch_text_input(input, text)?;
                }
            }
            InsertStep::AssignAndInput => {
                page.set_text_content(input, text)?;
                page.dispatch_input(input, Some(text))?;
            }
            InsertStep::ChangeEvent => page.dispatch_change(input)?,
        }
        Ok(())
    }
}

/// Clear the prompt input and type `text` into it. Direct assignment does
/// not reach the editor's state, so several insert signals are tried in turn.
pub fn enter_prompt(page: &mut dyn HostPage, profile: &HostProfile, clock: &dyn Clock, text: &str) -> Result<()> {
    let input = locate_input(page, profile)?;

    page.focus(input)?;
    sleep_ms(clock, 100);

    page.exec_command(&EditCommand::SelectAll)?;
    page.exec_command(&EditCommand::Delete)?;
    sleep_ms(clock, 50);
    if page.inner_html_len(input)? > 0 {
        page.clear_inner_html(input)?;
    }

    page.focus(input)?;
    let payload = if text.is_empty() { " " } else { text };
    let mut inserted = false;
    for step in INSERT_STEPS {
        step.apply(page, input, payload, &mut inserted)?;
    }

    sleep_ms(clock, 500);

    if page.inner_text(input)?.trim().is_empty() {
        logger::info("retry input entry...");
        page.set_text_content(input, text)?;
        page.dispatch_input(input, None)?;
    }

    logger::info(&format!("entered prompt: {}", preview(text)));
    Ok(())
}

fn preview(text: &str) -> String {
    let short: String = text.chars().take(50).collect();
    if short.len() < text.len() {
        format!("{}...", short)
    } else {
        short
    }
}

/// What a submit strategy gets to work with
pub struct SubmitContext<'a> {
    pub page: &'a mut dyn HostPage,
    pub clock: &'a dyn Clock,
    pub input: Option<ElementId>,
    pub prompt: &'a str,
}

/// One way of triggering generation.
pub trait SubmitStrategy: Send {
    fn name(&self) -> String;
    /// Try once. `Ok(true)` means the page took the submission.
    fn attempt(&self, ctx: &mut SubmitContext<'_>) -> Result<bool>;
}

/// Enter (press + release) on the focused input, verified by the input clearing.
pub struct EnterKey;

impl SubmitStrategy for EnterKey {
    fn name(&self) -> String {
        "enter key".into()
    }

    fn attempt(&self, ctx: &mut SubmitContext<'_>) -> Result<bool> {
        let Some(input) = ctx.input else { return Ok(false) };
        ctx.page.focus(input)?;
        sleep_ms(ctx.clock, 200);
        ctx.page.dispatch_key(input, "Enter", KeyPhase::Down)?;
        ctx.page.dispatch_key(input, "Enter", KeyPhase::Up)?;
        logger::info("dispatched Enter key");
        sleep_ms(ctx.clock, 1000);

        let mut residual = ctx.page.inner_text(input)?;
        if residual.is_empty() {
            residual = ctx.page.text_content(input)?;
        }
        let limit = CLEARED_BELOW.min(ctx.prompt.trim().chars().count()).max(1);
        Ok(residual.trim().chars().count() < limit)
    }
}

/// First enabled match among explicit submit selectors.
pub struct SelectorButton {
    pub selectors: Vec<String>,
}

impl SubmitStrategy for SelectorButton {
    fn name(&self) -> String {
        "submit selector".into()
    }

    fn attempt(&self, ctx: &mut SubmitContext<'_>) -> Result<bool> {
        for selector in &self.selectors {
            let Some(el) = ctx.page.query(selector)? else { continue };
            let enabled = ctx.page.button(el)?.map_or(false, |b| !b.disabled);
            if enabled {
                gesture_click(ctx.page, el)?;
                logger::success(&format!("clicked submit: {}", selector));
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Enabled button whose accessible label mentions sending.
pub struct LabeledButton {
    pub terms: Vec<String>,
}

impl SubmitStrategy for LabeledButton {
    fn name(&self) -> String {
        "labelled button".into()
    }

    fn attempt(&self, ctx: &mut SubmitContext<'_>) -> Result<bool> {
        let terms: Vec<String> = self.terms.iter().map(|t| t.to_lowercase()).collect();
        let found = ctx.page.buttons()?.into_iter().find(|b| {
            let label = b.aria_label.to_lowercase();
            !b.disabled && terms.iter().any(|t| label.contains(t.as_str()))
        });
        match found {
            Some(b) => {
                gesture_click(ctx.page, b.id)?;
                logger::success(&format!("clicked submit (label: {})", b.aria_label));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Rightmost enabled icon button on the input's row, right of the input.
pub struct NearestIconButton;

impl SubmitStrategy for NearestIconButton {
    fn name(&self) -> String {
        "icon button near input".into()
    }

    fn attempt(&self, ctx: &mut SubmitContext<'_>) -> Result<bool> {
        let Some(input) = ctx.input else { return Ok(false) };
        let Some(anchor) = ctx.page.rect(input)? else { return Ok(false) };

        let target = ctx
            .page
            .buttons()?
            .into_iter()
            .filter(|b| !b.disabled && b.has_icon)
            .filter(|b| (b.rect.top - anchor.top).abs() < SAME_ROW_PX && b.rect.left > anchor.left)
            .max_by(|a, b| a.rect.right.total_cmp(&b.rect.right));

        match target {
            Some(b) => {
                gesture_click(ctx.page, b.id)?;
                logger::success("clicked icon button near input");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Ordered submission plan: primary strategies once, then fallbacks with backoff.
pub struct Submitter {
    pub primary: Vec<Box<dyn SubmitStrategy>>,
    pub fallbacks: Vec<Box<dyn SubmitStrategy>>,
    pub attempts: u32,
}

impl Submitter {
    pub fn from_profile(profile: &HostProfile) -> Self {
        Self {
            primary: vec![Box::new(EnterKey)],
            fallbacks: vec![
                Box::new(SelectorButton { selectors: profile.submit_selectors.clone() }),
                Box::new(LabeledButton { terms: profile.submit_label_terms.clone() }),
                Box::new(NearestIconButton),
            ],
            attempts: profile.submit_attempts,
        }
    }

    /// Trigger generation. Returns the name of the strategy that worked.
    pub fn submit(
        &self,
        page: &mut dyn HostPage,
        profile: &HostProfile,
        clock: &dyn Clock,
        prompt: &str,
    ) -> Result<String> {
        logger::info("searching for submit button...");
        let input = page.find_first(&profile.prompt_input_selectors)?;
        let mut ctx = SubmitContext { page, clock, input, prompt };

        for strategy in &self.primary {
            if strategy.attempt(&mut ctx)? {
                logger::success(&format!("submit via {} worked", strategy.name()));
                return Ok(strategy.name());
            }
        }

        for attempt in 0..self.attempts {
            ctx.clock.sleep(jittered(BACKOFF_BASE * (attempt + 1)));
            for strategy in &self.fallbacks {
                if strategy.attempt(&mut ctx)? {
                    sleep_ms(ctx.clock, 500);
                    return Ok(strategy.name());
                }
            }
        }

        logger::error("could not find submit button");
        Err(GenerationError::SubmitNotFound.into())
    }
}
