use nextword_core::model::aggregate::merge_snapshots;
use nextword_core::model::language_model::LanguageModel;
use nextword_core::session::{FileStore, PredictionSession, SessionConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable RUST_LOG=debug to watch buffering and flushes.
    env_logger::init();

    // Session tuning usually arrives as configuration from the embedding
    // application; unset fields fall back to the defaults
    // (order 3, smoothing 1.0, flush threshold 100).
    let config: SessionConfig = serde_json::from_str(r#"{"order": 2, "flush_threshold": 4}"#)?;

    // "Phone": a session persisting to disk, fed a few typed sentences.
    let mut phone = PredictionSession::create(None, config.clone())?
        .with_store(Box::new(FileStore::new("./data/phone.snap")));
    println!("Phone persists to {:?}", phone.persist_path());

    phone.ingest("the cat sat on the mat")?;
    phone.ingest("the cat chased the mouse")?;
    phone.ingest("a mouse ran under the mat")?;
    phone.ingest("the cat slept all day")?; // fourth entry triggers the flush

    // Predictions come back ranked, as (token, score) pairs. Serialized to
    // JSON here, the same shape a keyboard UI would consume.
    let predictions = phone.predict("the", 3);
    println!("After 'the': {}", serde_json::to_string(&predictions)?);

    // Weighted sampling gives a varied continuation instead of the top one.
    if let Some(word) = phone.sample("the cat") {
        println!("Sampled continuation of 'the cat': {}", word);
    }

    // "Tablet": a second device training independently.
    let mut tablet = PredictionSession::create(None, config.clone())?;
    tablet.ingest("the dog barked at the mailman")?;
    tablet.flush()?; // force training before the threshold

    // Aggregation: both exports merged into one model, order-independent.
    let exports = vec![phone.export_snapshot(), tablet.export_snapshot()];
    let merged = merge_snapshots(exports)?.ok_or("no snapshots to merge")?;
    println!(
        "Aggregate knows {} words across {} occurrences",
        merged.word_count(),
        merged.total_words()
    );

    // The merged snapshot seeds a fresh session (the next federation round).
    let mut combined = PredictionSession::create(Some(&merged.serialize()), config)?;
    println!(
        "Merged model after 'the': {}",
        serde_json::to_string(&combined.predict("the", 3))?
    );

    // A corrupt snapshot is rejected and the session keeps its model.
    match combined.load(b"definitely not a snapshot") {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("Corrupt load rejected: {}", e),
    }
    println!(
        "Model survived the failed load: {} words",
        combined.model().word_count()
    );

    // Merging models of different orders is refused.
    let mut bigram = LanguageModel::new(2, 1.0);
    let trigram = LanguageModel::new(3, 1.0);
    match bigram.merge(&trigram) {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("Order mismatch rejected: {}", e),
    }

    Ok(())
}
