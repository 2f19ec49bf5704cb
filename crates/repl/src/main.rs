//! Interactive shell over the in-memory engine.
//!
//! Supports one-shot execution (`-e`) and an interactive loop with a few
//! meta-commands: `.tables`, `.explain <sql>`, `.optimize on|off`, `.quit`.

mod demo;

use anyhow::Result;
use clap::Parser;
use dataset::{DataSet, Query};
use planner::rules::{FilterMergeRule, FilterPushDownRule, SelectionExtSwapRule};
use planner::HeuristicPlanner;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tabled::builder::Builder;
use tabled::settings::Style;

#[derive(Parser, Debug)]
#[command(name = "toysql", about = "Interactive shell for the extensible SQL engine")]
struct Args {
    /// Execute the provided SQL and exit
    #[arg(short = 'e', long)]
    execute: Option<String>,

    /// Skip the heuristic optimizer
    #[arg(long)]
    no_optimize: bool,
}

struct Shell {
    dataset: DataSet,
    optimize: bool,
}

impl Shell {
    fn new(optimize: bool) -> Self {
        Self {
            dataset: demo::demo_dataset(),
            optimize,
        }
    }

    fn optimizer(&self) -> HeuristicPlanner {
        let mut optimizer = HeuristicPlanner::new();
        optimizer.add_rule(Box::new(FilterMergeRule::new()));
        optimizer.add_rule(Box::new(FilterPushDownRule::new()));
        if let Some(tag) = self.dataset.registry().rel_op_tag("sim_selection") {
            optimizer.add_rule(Box::new(SelectionExtSwapRule::new(tag)));
        }
        optimizer
    }

    fn query(&self, sql: &str) -> Result<Query<'_>> {
        let plan = parser::parse_statement(sql, self.dataset.registry())
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let optimizer = self.optimize.then(|| self.optimizer());
        Query::new(&self.dataset, plan, true, optimizer.as_ref())
            .map_err(|e| anyhow::anyhow!("{e}"))
    }

    fn run_sql(&self, sql: &str) -> Result<()> {
        let query = self.query(sql)?;
        let rows = query.rows(vec![]).map_err(|e| anyhow::anyhow!("{e}"))?;

        let mut builder = Builder::default();
        builder.push_record(query.headers());
        let count = rows.len();
        for row in rows {
            builder.push_record(row.values.iter().map(|v| v.to_string()));
        }
        let mut table = builder.build();
        table.with(Style::rounded());
        println!("{table}");
        println!("{count} row{}", if count == 1 { "" } else { "s" });
        Ok(())
    }

    fn explain(&self, sql: &str) -> Result<()> {
        let query = self.query(sql)?;
        print!("{}", query.explain());
        Ok(())
    }

    fn tables(&self) {
        for (name, schema) in self.dataset.relations() {
            println!("{name}({})", schema.field_names().join(", "));
        }
    }

    /// Returns false when the loop should exit.
    fn process_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }
        if line == ".quit" || line == ".exit" {
            return false;
        }
        if line == ".help" {
            print_help();
            return true;
        }
        if line == ".tables" {
            self.tables();
            return true;
        }
        if let Some(sql) = line.strip_prefix(".explain ") {
            if let Err(e) = self.explain(sql) {
                eprintln!("Error: {e}");
            }
            return true;
        }
        if let Some(flag) = line.strip_prefix(".optimize ") {
            self.optimize = flag.trim() == "on";
            println!("optimizer {}", if self.optimize { "on" } else { "off" });
            return true;
        }
        if let Err(e) = self.run_sql(line) {
            eprintln!("Error: {e}");
        }
        true
    }
}

fn print_help() {
    println!("Commands:");
    println!("  .tables           list available relations");
    println!("  .explain <sql>    show the (optimized) plan for a statement");
    println!("  .optimize on|off  toggle the heuristic optimizer");
    println!("  .quit             leave the shell");
    println!("Anything else is executed as SQL.");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    let mut shell = Shell::new(!args.no_optimize);

    if let Some(sql) = args.execute {
        return shell.run_sql(&sql);
    }

    let mut rl = DefaultEditor::new()?;
    println!("toysql: demo tables loaded, .help for commands");
    loop {
        match rl.readline("sql> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                let _ = rl.add_history_entry(&line);
                if !shell.process_line(&line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }
    Ok(())
}
