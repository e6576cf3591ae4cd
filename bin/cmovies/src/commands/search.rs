use clap::Parser;
use clap_handler::handler;
use cmovies::SearchClient;

#[derive(Parser, Clone, Debug)]
#[clap(name = "search")]
/// List IMDb titles matching a query
pub struct SearchCommand {
    /// Maximum number of results
    #[clap(short = 'n', long, default_value = "50")]
    pub limit: usize,

    /// Title to look up
    #[clap(required = true, num_args = 1..)]
    pub title: Vec<String>,
}

#[handler(SearchCommand)]
pub async fn search_command(me: SearchCommand) -> anyhow::Result<()> {
    let query = me.title.join(" ");
    let results = SearchClient::new()?.max_results(me.limit).search(&query).await?;

    for result in results {
        println!("{result}");
    }
    Ok(())
}
