use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bk_core::{
    Classifier, ContextId, EngineConfig, EngineError, Enforcement, EnforcementPort, ManualClock,
    NavigationEngine, NavigationEvent, SharedToggle,
};

struct Discard;

impl EnforcementPort for Discard {
    fn block(&mut self, _context: ContextId, _enforcement: Enforcement) -> Result<(), EngineError> {
        Ok(())
    }
}

fn urls() -> Vec<String> {
    vec![
        "https://news.example/article/2024/rust".to_string(),
        "https://accounts.example/oauth/callback?code=abc&state=xyz".to_string(),
        "https://clicks.example/?utm_source=feed&utm_campaign=spring".to_string(),
        format!("https://x.example/go?screen=1&gpu=2&canvas={}", "q".repeat(320)),
        "not a url".to_string(),
    ]
}

fn bench_classifier(c: &mut Criterion) {
    let classifier = Classifier::default();
    let urls = urls();
    let referrer = "https://news.example/";

    c.bench_function("looks_like_redirect_hub", |b| {
        b.iter(|| {
            for url in &urls {
                black_box(classifier.looks_like_redirect_hub(black_box(url)));
            }
        })
    });

    c.bench_function("is_suspicious_redirect", |b| {
        b.iter(|| {
            for url in &urls {
                black_box(classifier.is_suspicious_redirect(referrer, black_box(url)));
            }
        })
    });
}

fn bench_engine(c: &mut Criterion) {
    let urls = urls();
    let clock = ManualClock::new(0);
    let mut engine = NavigationEngine::new(
        EngineConfig::default(),
        SharedToggle::default(),
        Discard,
        clock.clone(),
    );

    c.bench_function("on_navigation", |b| {
        let mut tab = 0;
        b.iter(|| {
            tab = (tab + 1) % 64;
            clock.advance(250);
            for url in &urls {
                let event = NavigationEvent::server_redirect(ContextId(tab), url.as_str());
                black_box(engine.on_navigation(&event));
            }
        })
    });
}

criterion_group!(benches, bench_classifier, bench_engine);
criterion_main!(benches);
