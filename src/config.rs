use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentProviderKind {
    Stripe,
    Demo,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_host: String,
    pub bind_port: u16,
    pub amqp_host: String,
    pub amqp_port: u16,
    pub amqp_user: String,
    pub amqp_password: String,
    pub payment_provider: PaymentProviderKind,
    pub stripe_secret_key: Option<String>,
    pub payment_timeout_secs: u64,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub public_base_url: String,
    pub currency: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Config {
        let payment_provider = match var_or("PAYMENT_PROVIDER", "demo").to_lowercase().as_str() {
            "stripe" => PaymentProviderKind::Stripe,
            _ => PaymentProviderKind::Demo,
        };

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").ok();
        if payment_provider == PaymentProviderKind::Stripe && stripe_secret_key.is_none() {
            panic!("STRIPE_SECRET_KEY should be set when PAYMENT_PROVIDER=stripe");
        }

        Config {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL should be set"),
            bind_host: var_or("BIND_HOST", "127.0.0.1"),
            bind_port: var_or("BIND_PORT", "8080")
                .parse()
                .expect("BIND_PORT should be a port number"),
            amqp_host: var_or("AMQP_HOST", "localhost"),
            amqp_port: var_or("AMQP_PORT", "5672")
                .parse()
                .expect("AMQP_PORT should be a port number"),
            amqp_user: var_or("AMQP_USER", "guest"),
            amqp_password: var_or("AMQP_PASSWORD", "guest"),
            payment_provider,
            stripe_secret_key,
            payment_timeout_secs: var_or("PAYMENT_TIMEOUT_SECS", "10")
                .parse()
                .expect("PAYMENT_TIMEOUT_SECS should be a number of seconds"),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: var_or("EMAIL_FROM", "City Business Hotel <onboarding@resend.dev>"),
            public_base_url: var_or("PUBLIC_BASE_URL", "http://localhost:3000"),
            currency: var_or("CURRENCY", "usd"),
        }
    }
}
