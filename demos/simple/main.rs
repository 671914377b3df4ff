use hyphen_toggle::{ClientConfig, EvaluationContext, UserContext};

#[tokio::main]
pub async fn main() -> hyphen_toggle::Result<()> {
    // Configure env_logger to see client logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("hyphen")).init();

    let public_key = std::env::var("HYPHEN_PUBLIC_KEY")
        .expect("HYPHEN_PUBLIC_KEY env variable should contain a public key");
    let application = std::env::var("HYPHEN_APPLICATION").unwrap_or_else(|_| "demo-app".to_owned());
    let environment =
        std::env::var("HYPHEN_ENVIRONMENT").unwrap_or_else(|_| "development".to_owned());

    let provider = ClientConfig::new(public_key, application, environment).to_provider()?;

    let context = EvaluationContext::new()
        .targeting_key("test-subject")
        .custom_attribute("plan", "pro")
        .user(UserContext::new().id("test-subject").email("test@example.com"));

    let details = provider
        .resolve_boolean_value("a-boolean-toggle", false, &context)
        .await;

    if let Some(err) = &details.error {
        println!("falling back to default: {}", err);
    }
    println!("Toggle value: {:?}", details.value);

    Ok(())
}
