use overburden_db::migrations;

use crate::commands::{finish, open_pool, prepare, CommandResult, Failure};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("migrate") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5))?;
        pool.close().await;
        Ok::<(), Failure>(())
    });

    finish("migrate", result, |()| CommandResult::success("migrate", "applied pending migrations"))
}
