//! Greeting page demo.
//!
//! A page whose body is the same for everyone, except for a per-user
//! greeting and the user's name spelled out letter by letter. The page
//! body is cached once and shared; the greeting varies by user and is
//! resolved per request; each letter block carries its own cache key and
//! is shared by every user whose name contains it.

use std::sync::Arc;

use frag_cache::{MemoryBackend, RenderCache};
use frag_core::{
    BuilderRegistry, Fragment, MapContextProvider, RenderContext,
};
use frag_render::{aggregate, Renderer};
use tracing::info;

/// Spell a letter the way radio operators do.
fn letter_name(letter: &str) -> &'static str {
    match letter {
        "a" => "Alfa",
        "b" => "Bravo",
        "c" => "Charlie",
        "d" => "Delta",
        "e" => "Echo",
        "f" => "Foxtrot",
        "g" => "Golf",
        "h" => "Hotel",
        "i" => "India",
        "j" => "Juliett",
        "k" => "Kilo",
        "l" => "Lima",
        "m" => "Mike",
        "n" => "November",
        "o" => "Oscar",
        "p" => "Papa",
        "q" => "Quebec",
        "r" => "Romeo",
        "s" => "Sierra",
        "t" => "Tango",
        "u" => "Uniform",
        "v" => "Victor",
        "w" => "Whiskey",
        "x" => "X-ray",
        "y" => "Yankee",
        "z" => "Zulu",
        _ => "?",
    }
}

fn builders() -> BuilderRegistry {
    let mut registry = BuilderRegistry::new();

    // Greets the current user. Varies per user, so it is placeholdered
    // out of the shared page body and resolved per request.
    registry.register_fn("greeting", |ctx: RenderContext, _args| async move {
        let name = ctx.require("user")?;
        Ok(Fragment::markup(format!("Hello {}", name)))
    });

    // Spells the current user's name as a row of letter blocks, each a
    // deferred fragment with its own cache key.
    registry.register_fn("name-letters", |ctx: RenderContext, _args| async move {
        let name = ctx.require("user")?;
        let letters = name
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| {
                let letter = c.to_ascii_lowercase().to_string();
                Fragment::deferred("letter", vec![letter.clone()])
                    .with_cache_keys([format!("letter-{}", letter)])
            })
            .collect();
        Ok(Fragment::container(letters))
    });

    // One letter block. The same for everyone, so no contexts; the cache
    // key on the deferred fragment makes each letter its own entry.
    registry.register_fn("letter", |_ctx, args: Vec<String>| async move {
        Ok(Fragment::markup(format!(
            "<span class=\"letter-block\">{}</span> ",
            letter_name(&args[0])
        )))
    });

    registry
}

/// The page tree. Static copy plus two lazily built, user-varying parts.
fn page(user_id: u64) -> Fragment {
    Fragment::container(vec![
        Fragment::markup("<p>This content is the same for everyone.</p>\n"),
        Fragment::markup("<p>"),
        Fragment::deferred("greeting", vec![])
            .with_context("user")
            .with_tag(format!("user:{}", user_id))
            .with_cache_keys(["greeting"]),
        Fragment::markup("!</p>\n<p>Your name spelled out: "),
        Fragment::deferred("name-letters", vec![]).with_context("user"),
        Fragment::markup("</p>\n"),
    ])
    .with_cache_keys(["greeting-page"])
}

fn ctx(user: &str) -> RenderContext {
    RenderContext::new(Arc::new(MapContextProvider::new().with("user", user)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let backend = Arc::new(MemoryBackend::new());
    let renderer = Renderer::new(builders(), RenderCache::from_shared(backend.clone()));
    let tree = page(1);

    let variance = aggregate(&tree);
    info!(
        contexts = ?variance.contexts,
        tags = ?variance.tags,
        "page tree varies by"
    );

    for user in ["Alice", "Bob", "Alice"] {
        let rendered = renderer.render(&tree, &ctx(user)).await?;
        info!(
            user,
            status = %rendered.cache_status,
            contexts = ?rendered.cacheability.contexts,
            elapsed = ?rendered.timing.elapsed(),
            "rendered page"
        );
        println!("--- {} ({}) ---\n{}", user, rendered.cache_status, rendered.output);
    }

    info!(
        entries = backend.entry_count().await,
        "cache state after three renders"
    );

    // Editing user 1 invalidates everything tagged with them.
    let evicted = renderer.cache().invalidate_tag("user:1").await?;
    info!(evicted, "invalidated tag user:1");

    Ok(())
}
