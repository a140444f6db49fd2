use crate::client::IndegoClient;
use crate::transport::Transport;
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Follow the mower's state with long-polls, logging every change.
///
/// Runs for `max_iterations` rounds when given, otherwise forever. A failed
/// update only ends the loop when the client raises request errors; without
/// `raise_request_exceptions` failures are logged and the state stays as it was.
pub fn run_loop<T: Transport>(
    client: &mut IndegoClient<T>,
    longpoll_timeout: u64,
    interval: Duration,
    max_iterations: Option<usize>,
) -> Result<(), String> {
    let mut last_seen: Option<i64> = None;
    let mut iteration = 0;
    loop {
        if max_iterations.is_some_and(|max| iteration >= max) {
            return Ok(());
        }
        iteration += 1;
        let tick_start = Instant::now();

        // The first round has nothing to wait on
        let longpoll = client.data().state.is_some();
        client
            .update_state(false, longpoll, longpoll_timeout)
            .map_err(|e| format!("update_state failed: {}", e))?;
        log_change(client, &mut last_seen);

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}

fn log_change<T: Transport>(client: &IndegoClient<T>, last_seen: &mut Option<i64>) {
    let data = client.data();
    let Some(state) = data.state.as_ref() else {
        warn!("No state received yet");
        return;
    };
    if state.state == *last_seen {
        return;
    }
    *last_seen = state.state;
    info!(
        "State {}: {} ({}), mowed {}%",
        state.state.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
        data.state_description().unwrap_or("-"),
        data.state_description_detail().unwrap_or("-"),
        state.mowed.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::Credentials;
    use crate::transport::scripted::ScriptedTransport;
    use serde_json::json;

    fn client(transport: ScriptedTransport) -> IndegoClient<ScriptedTransport> {
        client_with(ClientConfig::new(Credentials::basic("me@example.com", "secret")), transport)
    }

    fn client_with(config: ClientConfig, transport: ScriptedTransport) -> IndegoClient<ScriptedTransport> {
        let mut client = IndegoClient::with_transport(config, transport);
        assert!(client.login().unwrap());
        client
    }

    #[test]
    fn follows_state_changes() {
        let transport = ScriptedTransport::new()
            .logged_in("123")
            .json(200, json!({"state": 258, "mowed": 10}))
            .status(504)
            .json(200, json!({"state": 513}));
        let mut client = client(transport);

        run_loop(&mut client, 60, Duration::ZERO, Some(3)).unwrap();

        let state = client.data().state.as_ref().unwrap();
        assert_eq!(state.state, Some(513));
        assert_eq!(state.mowed, Some(10));
    }

    #[test]
    fn stops_on_failed_update() {
        let config = ClientConfig::new(Credentials::basic("me@example.com", "secret")).raise_request_exceptions(true);
        let mut client = client_with(config, ScriptedTransport::new().logged_in("123"));
        let err = run_loop(&mut client, 0, Duration::ZERO, Some(2)).unwrap_err();
        assert!(err.contains("update_state"), "{}", err);
    }
}
