//! Interactive session loop.

use std::sync::Arc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::{
    api::SessionApi,
    config::SyncConfig,
    error::ClientError,
    gateway::ActionGateway,
    view::SessionView,
};

use super::{
    command::{Command, HELP, parse_command},
    formatter::SnapshotFormatter,
    ui::{print_above_prompt, prompt},
};

/// Read lines on a blocking thread and forward them to the async loop.
fn spawn_readline(prompt: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}

/// Print the outcome of an action that ran in the background.
fn report(result: Result<(), ClientError>, success: &str, session_id: &str, login_url: &str) {
    let text = match result {
        Ok(()) => format!("\n{}\n", success),
        // The user already left; nothing to show.
        Err(ClientError::Unmounted) => return,
        Err(e) if e.requires_login() => {
            format!("\nYour login expired. Log in again at {}\n", login_url)
        }
        Err(e) => format!("\nError: {}\n", e),
    };
    print_above_prompt(&text, session_id);
}

/// Run a gateway action without blocking the prompt.
fn spawn_action<F>(action: F, success: &'static str, session_id: &str, login_url: &str)
where
    F: Future<Output = Result<(), ClientError>> + Send + 'static,
{
    let session_id = session_id.to_string();
    let login_url = login_url.to_string();
    tokio::spawn(async move {
        let result = action.await;
        report(result, success, &session_id, &login_url);
    });
}

/// Join a session and run until the user leaves or the meeting ends.
pub async fn run_session(
    config: SyncConfig,
    api: Arc<dyn SessionApi>,
    session_id: String,
) -> Result<(), ClientError> {
    let login_url = config.login_url()?.to_string();

    let mut view = SessionView::mount(config, api, session_id.clone())?;
    let gateway = view.gateway();
    let mut state_rx = view.subscribe();
    let mut previous = state_rx.borrow_and_update().clone();

    println!(
        "\nJoined session '{}'. Type /help for commands, /quit to leave.",
        session_id
    );
    print_above_prompt(
        &SnapshotFormatter::format_speaker(previous.current_participant.as_ref()),
        &session_id,
    );

    let mut input_rx = spawn_readline(prompt(&session_id));

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = state_rx.borrow_and_update().clone();
                let changes = SnapshotFormatter::render_changes(&previous, &next, &login_url);
                print_above_prompt(&changes, &session_id);
                let ended = next.meeting_ended;
                previous = next;
                if ended {
                    break;
                }
            }
            line = input_rx.recv() => {
                let Some(line) = line else {
                    break;
                };

                match parse_command(&line) {
                    Command::Quit => break,
                    Command::Help => print_above_prompt(HELP, &session_id),
                    Command::Unknown(name) => {
                        let text = format!("Unknown command '/{}'\n{}", name, HELP);
                        print_above_prompt(&text, &session_id);
                    }
                    Command::Reconnect => {
                        let text = match view.reconnect() {
                            Ok(true) => "Reconnecting...\n".to_string(),
                            Ok(false) => "Connection is still active.\n".to_string(),
                            Err(e) => format!("Error: {}\n", e),
                        };
                        print_above_prompt(&text, &session_id);
                    }
                    Command::Refresh => {
                        // Failures show up through `comments_error` in the snapshot.
                        let gateway = gateway.clone();
                        tokio::spawn(async move {
                            if let Ok(count) = gateway.load_comments().await {
                                let text = format!("\nLoaded {} comments.\n", count);
                                print_above_prompt(&text, gateway.session_id());
                            }
                        });
                    }
                    Command::Minutes => {
                        let text = match gateway.load_minutes().await {
                            Ok(minutes) => SnapshotFormatter::format_minutes(&minutes),
                            Err(e) => format!("Error: {}\n", e),
                        };
                        print_above_prompt(&text, &session_id);
                    }
                    Command::SaveMinutes(content) => {
                        if gateway.is_saving_minutes() {
                            print_above_prompt("Minutes are still being saved.\n", &session_id);
                            continue;
                        }
                        let gateway = gateway.clone();
                        spawn_action(
                            async move { gateway.save_minutes(&content).await },
                            "Minutes saved.",
                            &session_id,
                            &login_url,
                        );
                    }
                    Command::Comment { stars, content } => {
                        if gateway.is_submitting_comment() {
                            print_above_prompt("A comment is still being posted.\n", &session_id);
                            continue;
                        }
                        let gateway = gateway.clone();
                        spawn_action(
                            async move { gateway.submit_comment(&content, stars).await },
                            "Comment posted.",
                            &session_id,
                            &login_url,
                        );
                    }
                    Command::Summary(summary) => {
                        if gateway.is_submitting_summary() {
                            let text = "Your summary is still being submitted.\n";
                            print_above_prompt(text, &session_id);
                            continue;
                        }
                        let gateway = gateway.clone();
                        spawn_action(
                            async move { gateway.submit_summary(&summary).await },
                            "Summary submitted.",
                            &session_id,
                            &login_url,
                        );
                    }
                }
            }
        }
    }

    view.unmount().await;
    println!("\nLeft session '{}'.", session_id);
    Ok(())
}
