use std::io::Write;

use futures::{Stream, StreamExt};
use keelson::sse::{done_event, to_sse_event};
use keelson::{AgentEvent, RunResponse};

/// Writes each event as an SSE frame. Streams that end on an error get a
/// single `[DONE]` terminator so every stream closes with one done frame.
pub async fn write_sse<S, W>(mut events: S, out: &mut W) -> std::io::Result<()>
where
    S: Stream<Item = AgentEvent> + Unpin,
    W: Write,
{
    let mut finished = false;
    while let Some(event) = events.next().await {
        finished = matches!(event, AgentEvent::Done { .. });
        out.write_all(to_sse_event(&event).as_bytes())?;
        out.flush()?;
    }
    if !finished {
        out.write_all(done_event().as_bytes())?;
        out.flush()?;
    }
    Ok(())
}

pub fn print_response(response: &RunResponse) -> anyhow::Result<()> {
    println!("{}", response.message);
    if let Some(widget) = &response.widget {
        println!("{}", serde_json::to_string_pretty(widget)?);
    }
    tracing::info!(
        thread_id = %response.thread_id,
        iterations = response.iteration_count,
        tools = response.tool_results.len(),
        "run complete"
    );
    Ok(())
}
