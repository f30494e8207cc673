use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use libtest_mimic::{Arguments, Failed, Trial};

use genbatch_core::orchestrator::orchestrate;
use genbatch_core::page::stub::{MediaStep, StubDom};
use genbatch_core::types::{
    Command, CompletionReason, GenerationMode, Notification, PromptStatus, Response,
};
use genbatch_test::*;

macro_rules! check_eq {
    ($left:expr, $right:expr) => {{
        let (l, r) = (&$left, &$right);
        if l != r {
            return Err(format!("{} = {:?}, expected {:?}", stringify!($left), l, r).into());
        }
    }};
}

macro_rules! check {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("failed: {}", stringify!($cond)).into());
        }
    };
}

const FULL_RUN: [PromptStatus; 3] = [PromptStatus::Generating, PromptStatus::Downloading, PromptStatus::Completed];

fn completions(events: &[Notification]) -> Vec<CompletionReason> {
    events
        .iter()
        .filter_map(|n| match n {
            Notification::GenerationComplete { reason } => Some(*reason),
            _ => None,
        })
        .collect()
}

fn two_image_prompts() -> Result<(), Failed> {
    let mut dom = host_dom();
    dom.script(image_generation("cat"));
    dom.script(image_generation("dog"));
    let mut h = Harness::new(dom);

    let reason = h.orch.run_batch(batch(GenerationMode::Image, "1:1", &["a cat", "a dog"]));
    check_eq!(reason, Some(CompletionReason::Finished));

    let events = h.drain();
    check_eq!(statuses(&events, 1), FULL_RUN.to_vec());
    check_eq!(statuses(&events, 2), FULL_RUN.to_vec());
    check_eq!(completions(&events), vec![CompletionReason::Finished]);

    let mut expected: Vec<String> = (1..=4).map(|n| cdn(&format!("cat-{}.jpg", n))).collect();
    expected.extend((1..=4).map(|n| cdn(&format!("dog-{}.jpg", n))));
    check_eq!(h.download_urls(), expected);

    let requests = h.downloads.requests.lock().unwrap().clone();
    check!(requests[0].filename.starts_with("meta-ai-") && requests[0].filename.ends_with("-1.jpg"));
    check!(requests[3].filename.ends_with("-4.jpg"));

    let dom = h.page.dom();
    check_eq!(dom.selected_options, vec!["Image".to_string(), "1:1".to_string()]);
    check_eq!(dom.submitted, vec!["a cat".to_string(), "a dog".to_string()]);
    drop(dom);

    // One inter-prompt delay, none after the last prompt
    check!(h.clock.elapsed() >= Duration::from_secs(3));
    Ok(())
}

fn stop_between_prompts() -> Result<(), Failed> {
    let mut dom = host_dom();
    dom.script(image_generation("cat"));
    dom.script(image_generation("dog"));
    let mut h = Harness::new(dom);
    h.stop_after_downloads(4);

    let reason = h.orch.run_batch(batch(GenerationMode::Image, "9:16", &["a cat", "a dog"]));
    check_eq!(reason, Some(CompletionReason::Stopped));

    let events = h.drain();
    check_eq!(statuses(&events, 1), FULL_RUN.to_vec());
    check!(statuses(&events, 2).is_empty());
    check_eq!(completions(&events), vec![CompletionReason::Stopped]);
    check_eq!(h.download_urls().len(), 4);
    check_eq!(h.page.dom().submitted.len(), 1);

    let queue = h.orch.queue();
    let queue = queue.lock().unwrap();
    check_eq!(queue[0].status, PromptStatus::Completed);
    check_eq!(queue[1].status, PromptStatus::Pending);
    Ok(())
}

fn stop_while_waiting_for_media() -> Result<(), Failed> {
    let mut dom = host_dom();
    // Submission is accepted but nothing ever renders
    dom.script(Vec::new());
    let clock = Arc::new(TrippingClock::new(Duration::from_secs(20)));
    let mut h = Harness::with_clock(dom, clock.clone());
    clock.arm(h.orch.cancel_token());

    let reason = h.orch.run_batch(batch(GenerationMode::Image, "9:16", &["a cat", "a dog"]));
    check_eq!(reason, Some(CompletionReason::Stopped));

    let events = h.drain();
    check_eq!(statuses(&events, 1), vec![PromptStatus::Generating, PromptStatus::Pending]);
    check!(statuses(&events, 2).is_empty());
    check!(h.download_urls().is_empty());
    // Well before the 120s image timeout
    check!(h.clock.elapsed() < Duration::from_secs(25));
    Ok(())
}

fn video_prompt_skips_ratio() -> Result<(), Failed> {
    let mut dom = host_dom();
    dom.prepend_video(&cdn("older.mp4"));
    dom.script(video_generation("wave"));
    let mut h = Harness::new(dom);

    let reason = h.orch.run_batch(batch(GenerationMode::Video, "1:1", &["a wave"]));
    check_eq!(reason, Some(CompletionReason::Finished));
    check_eq!(h.download_urls(), vec![cdn("wave.mp4")]);
    check!(h.downloads.requests.lock().unwrap()[0].filename.contains("-video-"));
    check_eq!(h.page.dom().selected_options, vec!["Video".to_string()]);
    Ok(())
}

fn missing_dropdowns_use_page_defaults() -> Result<(), Failed> {
    let mut dom = StubDom::default();
    dom.add_send_button();
    dom.script(image_generation("bird"));
    let mut h = Harness::new(dom);

    let reason = h.orch.run_batch(batch(GenerationMode::Image, "16:9", &["a bird"]));
    check_eq!(reason, Some(CompletionReason::Finished));
    check_eq!(h.download_urls().len(), 4);
    check!(h.page.dom().selected_options.is_empty());
    Ok(())
}

fn timeout_marks_error_and_continues() -> Result<(), Failed> {
    let mut dom = host_dom();
    dom.script(Vec::new());
    dom.script(image_generation("late"));
    let mut h = Harness::new(dom);

    let reason = h.orch.run_batch(batch(GenerationMode::Image, "9:16", &["nothing", "something"]));
    check_eq!(reason, Some(CompletionReason::Finished));

    let events = h.drain();
    check_eq!(statuses(&events, 1), vec![PromptStatus::Generating, PromptStatus::Error]);
    check_eq!(statuses(&events, 2), FULL_RUN.to_vec());
    check!(h.clock.elapsed() >= Duration::from_secs(120));
    check_eq!(h.download_urls().len(), 4);
    Ok(())
}

fn second_prompt_times_out_after_first_succeeds() -> Result<(), Failed> {
    let mut dom = host_dom();
    dom.script(image_generation("cat"));
    dom.script(Vec::new());
    let mut h = Harness::new(dom);

    let reason = h.orch.run_batch(batch(GenerationMode::Image, "9:16", &["a cat", "nothing"]));
    check_eq!(reason, Some(CompletionReason::Finished));

    let events = h.drain();
    check_eq!(statuses(&events, 1), FULL_RUN.to_vec());
    check_eq!(statuses(&events, 2), vec![PromptStatus::Generating, PromptStatus::Error]);
    check_eq!(completions(&events), vec![CompletionReason::Finished]);
    check_eq!(h.download_urls().len(), 4);
    check!(h.clock.elapsed() >= Duration::from_secs(123));

    let queue = h.orch.queue();
    let queue = queue.lock().unwrap();
    check_eq!(queue[0].status, PromptStatus::Completed);
    check_eq!(queue[1].status, PromptStatus::Error);
    Ok(())
}

fn short_generation_downloads_what_arrived() -> Result<(), Failed> {
    let mut dom = host_dom();
    let arrived = [cdn("half-1.jpg"), cdn("half-2.jpg")];
    dom.script(vec![MediaStep::none(), MediaStep::images(&arrived[..])]);
    let mut h = Harness::new(dom);

    let reason = h.orch.run_batch(batch(GenerationMode::Image, "9:16", &["only half"]));
    check_eq!(reason, Some(CompletionReason::Finished));

    let events = h.drain();
    check_eq!(statuses(&events, 1), FULL_RUN.to_vec());
    check_eq!(h.download_urls(), arrived.to_vec());
    check!(h.clock.elapsed() >= Duration::from_secs(120));
    Ok(())
}

fn missing_input_errors_every_prompt() -> Result<(), Failed> {
    let mut dom = host_dom();
    dom.input_present = false;
    let mut h = Harness::new(dom);

    let reason = h.orch.run_batch(batch(GenerationMode::Image, "9:16", &["one", "two"]));
    check_eq!(reason, Some(CompletionReason::Finished));

    let events = h.drain();
    check_eq!(statuses(&events, 1), vec![PromptStatus::Generating, PromptStatus::Error]);
    check_eq!(statuses(&events, 2), vec![PromptStatus::Generating, PromptStatus::Error]);
    check_eq!(completions(&events), vec![CompletionReason::Finished]);
    Ok(())
}

fn controller_drives_orchestrator_thread() -> Result<(), Failed> {
    let mut dom = host_dom();
    dom.script(image_generation("fox"));
    let Harness { orch, downloads, events, .. } = Harness::new(dom);

    let (cmd_tx, cmd_rx) = mpsc::channel();
    let ctl = orch.controller(cmd_tx);
    let worker = thread::spawn(move || orchestrate(orch, cmd_rx));

    check_eq!(ctl.dispatch(Command::Ping), Response::Ok);
    check_eq!(
        ctl.dispatch(Command::StartGeneration(batch(GenerationMode::Image, "9:16", &["a fox"]))),
        Response::Started
    );
    check_eq!(
        ctl.dispatch(Command::StartGeneration(batch(GenerationMode::Image, "9:16", &["again"]))),
        Response::Busy
    );

    let reason = loop {
        match events.recv_timeout(Duration::from_secs(10)) {
            Ok(Notification::GenerationComplete { reason }) => break reason,
            Ok(_) => continue,
            Err(e) => return Err(format!("no completion: {}", e).into()),
        }
    };
    check_eq!(reason, CompletionReason::Finished);
    check!(!ctl.is_processing());
    check_eq!(downloads.requests.lock().unwrap().len(), 4);

    ctl.dispatch(Command::Quit);
    worker.join().map_err(|_| Failed::from("orchestrator thread panicked"))?;
    Ok(())
}

fn main() {
    let args = Arguments::from_args();
    let trials = vec![
        Trial::test("two_image_prompts", two_image_prompts),
        Trial::test("stop_between_prompts", stop_between_prompts),
        Trial::test("stop_while_waiting_for_media", stop_while_waiting_for_media),
        Trial::test("video_prompt_skips_ratio", video_prompt_skips_ratio),
        Trial::test("missing_dropdowns_use_page_defaults", missing_dropdowns_use_page_defaults),
        Trial::test("timeout_marks_error_and_continues", timeout_marks_error_and_continues),
        Trial::test("second_prompt_times_out_after_first_succeeds", second_prompt_times_out_after_first_succeeds),
        Trial::test("short_generation_downloads_what_arrived", short_generation_downloads_what_arrived),
        Trial::test("missing_input_errors_every_prompt", missing_input_errors_every_prompt),
        Trial::test("controller_drives_orchestrator_thread", controller_drives_orchestrator_thread),
    ];
    libtest_mimic::run(&args, trials).exit();
}
