use clap::Subcommand;
use clap_handler::Handler;

pub mod extract;
mod media;
mod search;

#[derive(Subcommand, Clone, Handler)]
pub enum CmoviesCommand {
    Extract(extract::ExtractCommand),
    Search(search::SearchCommand),
    Media(media::MediaCommand),
}
