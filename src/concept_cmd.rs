//! `csearch concept ...` commands.

use anyhow::Result;

use crate::concepts::{ConceptAlgebra, ConceptMix};
use crate::context::Context;
use crate::get::format_ts_iso;
use crate::search::{print_response, SearchEngine};

pub async fn run_add(ctx: &Context, name: &str, text: &str) -> Result<()> {
    let info = ConceptAlgebra::new(ctx.clone())
        .store_concept(name, text)
        .await?;
    println!("Stored concept {}", info.name);
    Ok(())
}

pub async fn run_list(ctx: &Context, json: bool) -> Result<()> {
    let concepts = ConceptAlgebra::new(ctx.clone()).list_concepts().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&concepts)?);
        return Ok(());
    }

    if concepts.is_empty() {
        println!("No concepts.");
        return Ok(());
    }

    for concept in &concepts {
        println!(
            "{:<24}  {}  {}",
            concept.name,
            format_ts_iso(concept.created_at),
            concept.source_text.replace('\n', " ")
        );
    }
    Ok(())
}

pub async fn run_delete(ctx: &Context, name: &str) -> Result<()> {
    ConceptAlgebra::new(ctx.clone()).delete_concept(name).await?;
    println!("Deleted concept {}", name);
    Ok(())
}

/// Search with a mix such as `safety:1.0,hype:-0.5`.
pub async fn run_mix(ctx: &Context, mix: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let mix: ConceptMix = mix.parse()?;
    let limit = limit.unwrap_or(ctx.config.retrieval.default_limit);
    let response = SearchEngine::new(ctx.clone())
        .concept_search(&mix, limit)
        .await?;
    print_response(&response, json)
}

pub async fn run_debias(
    ctx: &Context,
    main: &str,
    remove: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(ctx.config.retrieval.default_limit);
    let response = SearchEngine::new(ctx.clone())
        .debias_search(main, remove, limit)
        .await?;
    print_response(&response, json)
}
