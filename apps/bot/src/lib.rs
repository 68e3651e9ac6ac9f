use tracker::ReportBuilder;

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod feedback;

pub struct Data {
    pub reports: ReportBuilder,
    pub config: config::Config,
}

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;
