//! Process wiring for multireact: configuration, storage bootstrap, the health endpoint and the
//! OAuth state sweeper. Embedders supply the Slack Web API client to
//! [`bootstrap::Application::dispatcher`].

pub mod bootstrap;
pub mod health;
