use serde_json::json;
use tempfile::TempDir;

/// Creates a throwaway SQLite database file. Keep the returned `TempDir`
/// alive for as long as the database is used.
pub fn temp_database() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("parley.db").display());

    return (dir, url);
}

/// Server-sent events body as returned by OpenAI compatible streaming chat
/// completions.
pub fn openai_stream_body(fragments: &[&str]) -> String {
    let mut lines = vec![json!({
        "choices": [{ "delta": { "role": "assistant" } }]
    })
    .to_string()];

    for fragment in fragments {
        lines.push(
            json!({
                "choices": [{ "delta": { "content": fragment } }]
            })
            .to_string(),
        );
    }

    let mut body = lines
        .iter()
        .map(|line| return format!("data: {line}\n\n"))
        .collect::<Vec<String>>()
        .join("");
    body += "data: [DONE]\n\n";

    return body;
}

/// Newline delimited JSON body as returned by Ollama's streaming chat API.
pub fn ollama_stream_body(fragments: &[&str]) -> String {
    let mut lines = fragments
        .iter()
        .map(|fragment| {
            return json!({
                "model": "llama2",
                "message": { "role": "assistant", "content": fragment },
                "done": false
            })
            .to_string();
        })
        .collect::<Vec<String>>();

    lines.push(
        json!({
            "model": "llama2",
            "message": { "role": "assistant", "content": "" },
            "done": true
        })
        .to_string(),
    );

    return lines.join("\n");
}

pub fn long_reply_fixture() -> &'static str {
    return r#"
Sure! Here is a short overview of the three primary colours used when mixing paint, along with a little history about how they came to be taught in schools.

Red, yellow and blue.

That's it!
"#
    .trim();
}
