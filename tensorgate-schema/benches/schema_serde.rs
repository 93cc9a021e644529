use criterion::{Criterion, criterion_group, criterion_main};
use tensorgate_schema::{ChatCompletionRequest, ChatMessage};

fn bench_request_round_trip(c: &mut Criterion) {
    let req = ChatCompletionRequest {
        model: "gpt-4".to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: "hello there".to_string(),
            extra: Default::default(),
        }],
        max_tokens: Some(64),
        temperature: Some(0.7),
        stream: false,
        extra: Default::default(),
    };

    c.bench_function("chat_completion_request_serde_round_trip", |b| {
        b.iter(|| {
            let json = serde_json::to_string(&req).unwrap();
            let _: ChatCompletionRequest = serde_json::from_str(&json).unwrap();
        });
    });
}

criterion_group!(benches, bench_request_round_trip);
criterion_main!(benches);
