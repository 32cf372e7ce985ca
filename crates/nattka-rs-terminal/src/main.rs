use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use nattka_rs::actions::{apply_bugs, commit_bugs, find_bugs, make_package_list, resolve_bugs, select_arches};
use nattka_rs::actions::{ApplyOptions, BugSelection, CommitOptions, MakePackageListOptions, ResolveOptions};
use nattka_rs::bug::Bugzilla;
use nattka_rs::cache::Cache;
use nattka_rs::checker::Pkgcheck;
use nattka_rs::git::{GitWorkTree, WorkTree};
use nattka_rs::repository::{find_repository, EbuildRepository};
use nattka_rs::sanity_check::{BugOutcome, SanityCheck, SanityCheckOptions};
use nattka_rs::{BugCategory, Config, Repository};

const USAGE: &str = "Usage: nattka-rs [options] <command> [bug...|package...]

Commands:
    apply              keyword packages in the local repository
    commit             commit keywords applied by apply
    resolve            un-CC arches that are done and close finished bugs
    sanity-check       check bugs and update their sanity-check flag
    make-package-list  build a package list satisfying dependencies";

fn main() -> ExitCode {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",                  "Show help");
		opts.optflag( "q", "quiet",                 "Only log errors");
		opts.optopt(  "",  "log-file",              "Append log output to a file", "PATH");
		opts.optopt(  "",  "api-key",               "Bugzilla API key, ~/.bugz_token is used otherwise", "KEY");
		opts.optopt(  "",  "bugzilla-endpoint",     "Bugzilla REST endpoint", "URL");
		opts.optopt(  "",  "repo",                  "Ebuild repository to work on", "PATH");
		opts.optmulti("a", "arch",                  "Arch to act on, wildcards allowed", "ARCH");
		opts.optflag( "",  "keywordreq",            "Only keywording bugs");
		opts.optflag( "",  "stablereq",             "Only stabilization bugs");
		opts.optflag( "",  "security",              "Only security bugs");
		opts.optflag( "",  "no-fetch-dependencies", "Do not fetch dependencies of selected bugs");
		opts.optflag( "",  "ignore-allarches",      "Treat ALLARCHES bugs like any other");
		opts.optflag( "",  "ignore-dependencies",   "apply: ignore unresolved dependency bugs");
		opts.optflag( "",  "ignore-sanity-check",   "apply: ignore the sanity-check flag");
		opts.optflag( "n", "no-update",             "apply: only print the package list");
		opts.optflag( "",  "no-resolve",            "resolve: never close bugs");
		opts.optflag( "",  "pretend",               "resolve: only log what would be done");
		opts.optflag( "u", "update-bugs",           "sanity-check: send results to the tracker");
		opts.optopt(  "",  "bug-limit",             "sanity-check: stop after checking this many bugs", "N");
		opts.optopt(  "",  "time-limit",            "sanity-check: stop taking new bugs after this many seconds", "SECS");
		opts.optopt(  "c", "cache-file",            "sanity-check: cache location", "PATH");
		opts.optopt(  "",  "cache-max-age",         "sanity-check: seconds before a cached result expires", "SECS");
		opts.optflag( "s", "stabilization",         "make-package-list: build a stabilization list");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { eprintln!("Unable to parse options: {}", e); return ExitCode::FAILURE }
		};

		if parsed_options.opt_present("h") || parsed_options.free.is_empty() {
			eprintln!("{}", opts.usage(USAGE));
			return ExitCode::FAILURE;
		}

		parsed_options
	};

	if let Err(e) = init_logging(&parsed_options) {
		eprintln!("Unable to set up logging: {}", e);
		return ExitCode::FAILURE;
	}

	let command = parsed_options.free[0].as_str();
	let args = &parsed_options.free[1..];
	let res = match command {
		"apply" => apply(&parsed_options, args),
		"commit" => commit(&parsed_options, args),
		"resolve" => resolve(&parsed_options, args),
		"sanity-check" => sanity_check(&parsed_options, args),
		"make-package-list" => make_list(&parsed_options, args),
		c => {
			log::error!("Unknown command: {}", c);
			eprintln!("{}", opts.usage(USAGE));
			return ExitCode::FAILURE;
		},
	};

	match res {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::from(1),
		Err(e) => {
			log::error!("{}", e);
			ExitCode::from(2)
		},
	}
}

fn init_logging(options: &getopts::Matches) -> Result<(), Error> {
	let default = if options.opt_present("q") { "nattka_rs=error" } else { "nattka_rs=info" };
	let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default));
	if let Some(path) = options.opt_str("log-file") {
		let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
		builder.target(env_logger::Target::Pipe(Box::new(file)));
		builder.format(|buf, record| {
			writeln!(buf, "{} [{}] {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.args())
		});
	}
	builder.init();
	Ok(())
}

fn load_config(options: &getopts::Matches) -> Result<Config, Error> {
	let mut config = Config::default();
	if let Some(endpoint) = options.opt_str("bugzilla-endpoint") {
		config.set_bugzilla_endpoint(endpoint);
	}
	config.set_api_key(options.opt_str("api-key"));
	if let Some(repo) = options.opt_str("repo") {
		if !config.set_repo_path(PathBuf::from(&repo)) {
			return Err(Error::InvalidArgument(format!("{} is not a directory", repo)));
		}
	}
	if let Some(path) = options.opt_str("cache-file") {
		config.set_cache_path(PathBuf::from(path));
	}
	if let Some(age) = opt_number(options, "cache-max-age")? {
		config.set_cache_max_age(Duration::from_secs(age));
	}
	Ok(config)
}

fn opt_number(options: &getopts::Matches, name: &str) -> Result<Option<u64>, Error> {
	options.opt_str(name)
		.map(|v| v.parse().map_err(|_| Error::InvalidArgument(format!("--{} expects a number, got {}", name, v))))
		.transpose()
}

fn open_repository(config: &Config) -> Result<EbuildRepository, Error> {
	let repo = find_repository(config.repo_path())?;
	log::debug!("Using repository at {}", repo.location().display());
	Ok(repo)
}

fn open_tracker(config: &Config, require_key: bool) -> Result<Bugzilla, Error> {
	let api_key = config.load_api_key()?;
	if require_key && api_key.is_none() {
		return Err(Error::MissingArgument("--api-key"));
	}
	Ok(Bugzilla::new(config.bugzilla_endpoint(), api_key)?)
}

fn selection(options: &getopts::Matches, args: &[String]) -> Result<BugSelection, Error> {
	let bugs = args.iter()
		.map(|a| a.parse().map_err(|_| Error::InvalidArgument(format!("{} is not a bug number", a))))
		.collect::<Result<Vec<u64>, Error>>()?;
	let mut categories = Vec::new();
	if options.opt_present("keywordreq") {
		categories.push(BugCategory::KeywordReq);
	}
	if options.opt_present("stablereq") {
		categories.push(BugCategory::StableReq);
	}
	Ok(BugSelection {
		bugs,
		categories,
		security: options.opt_present("security"),
		fetch_dependencies: !options.opt_present("no-fetch-dependencies"),
		cc: Vec::new(),
	})
}

fn arches(options: &getopts::Matches, config: &Config, repo: &dyn Repository) -> Result<Vec<String>, Error> {
	Ok(select_arches(repo.known_arches(), &options.opt_strs("arch"), config.default_arch())?)
}

/// Only bugs with one of `arches` CC-ed are of interest.
fn cc_arches(config: &Config, arches: &[String]) -> Vec<String> {
	if arches.len() == 1 {
		vec![config.arch_cc_address(&arches[0])]
	} else {
		Vec::new()
	}
}

fn apply(options: &getopts::Matches, args: &[String]) -> Result<bool, Error> {
	let config = load_config(options)?;
	let repo = open_repository(&config)?;
	let tracker = open_tracker(&config, false)?;
	let arches = arches(options, &config, &repo)?;

	let mut selection = selection(options, args)?;
	selection.cc = cc_arches(&config, &arches);
	let (order, bugs) = find_bugs(&tracker, &selection)?;

	let apply_options = ApplyOptions {
		arches,
		ignore_allarches: options.opt_present("ignore-allarches"),
		ignore_dependencies: options.opt_present("ignore-dependencies"),
		ignore_sanity_check: options.opt_present("ignore-sanity-check"),
		no_update: options.opt_present("n"),
	};
	let (out, failed) = apply_bugs(&repo, &order, &bugs, &apply_options)?;
	print!("{}", out);
	Ok(!failed)
}

fn commit(options: &getopts::Matches, args: &[String]) -> Result<bool, Error> {
	let config = load_config(options)?;
	let repo = open_repository(&config)?;
	let tree = GitWorkTree::open(repo.location())?;
	let tracker = open_tracker(&config, false)?;
	let arches = arches(options, &config, &repo)?;

	let mut selection = selection(options, args)?;
	selection.cc = cc_arches(&config, &arches);
	let (order, bugs) = find_bugs(&tracker, &selection)?;

	let commit_options = CommitOptions { arches, ignore_allarches: options.opt_present("ignore-allarches") };
	let (summaries, failed) = commit_bugs(&repo, tree.path(), &order, &bugs, &commit_options)?;
	for s in summaries {
		print!("{}", s);
	}
	Ok(!failed)
}

fn resolve(options: &getopts::Matches, args: &[String]) -> Result<bool, Error> {
	let config = load_config(options)?;
	let repo = open_repository(&config)?;
	let pretend = options.opt_present("pretend");
	let tracker = open_tracker(&config, !pretend)?;
	let arches = arches(options, &config, &repo)?;

	let mut selection = selection(options, args)?;
	selection.fetch_dependencies = false;
	let (order, bugs) = find_bugs(&tracker, &selection)?;

	let resolve_options = ResolveOptions {
		arches,
		ignore_allarches: options.opt_present("ignore-allarches"),
		no_resolve: options.opt_present("no-resolve"),
		pretend,
		arch_cc_domain: config.arch_cc_domain().to_string(),
	};
	let failed = resolve_bugs(&tracker, repo.known_arches(), &order, &bugs, &resolve_options)?;
	Ok(!failed)
}

fn sanity_check(options: &getopts::Matches, args: &[String]) -> Result<bool, Error> {
	let config = load_config(options)?;
	let repo = open_repository(&config)?;
	let update_bugs = options.opt_present("u");
	let tracker = open_tracker(&config, update_bugs)?;
	let checker = Pkgcheck::new(repo.location(), config.checker_profiles());
	let mut tree = GitWorkTree::open(repo.location())?;

	let mut check_options = SanityCheckOptions::from_config(&config);
	check_options.update_bugs = update_bugs;
	check_options.bug_limit = opt_number(options, "bug-limit")?.map(|n| n as usize);
	check_options.time_limit = opt_number(options, "time-limit")?.map(Duration::from_secs);
	let cache = Cache::load(config.cache_path())?;
	log::debug!("Loaded {} cache entries from {}", cache.len(), config.cache_path().display());

	let (order, mut bugs) = find_bugs(&tracker, &selection(options, args)?)?;
	let mut check = SanityCheck::new(&repo, &tracker, &checker, &mut tree, cache, check_options);
	let outcomes = check.run(&order, &mut bugs)?;
	Ok(!outcomes.iter().any(|(_, o)| matches!(o, BugOutcome::UpdateFailed(..))))
}

fn make_list(options: &getopts::Matches, args: &[String]) -> Result<bool, Error> {
	if args.is_empty() {
		return Err(Error::MissingArgument("package"));
	}
	let config = load_config(options)?;
	let repo = open_repository(&config)?;
	let checker = Pkgcheck::new(repo.location(), config.checker_profiles());
	let mut tree = GitWorkTree::open(repo.location())?;

	let patterns = options.opt_strs("arch");
	let arches = if patterns.is_empty() { Vec::new() } else { select_arches(repo.known_arches(), &patterns, None)? };
	let list_options = MakePackageListOptions {
		packages: args.to_vec(),
		arches,
		stabilization: options.opt_present("s"),
		arch_cc_domain: config.arch_cc_domain().to_string(),
	};
	print!("{}", make_package_list(&repo, &checker, &mut tree, &list_options)?);
	Ok(true)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("NATTkA-rs error: {0}")]
	NattkaRsError(#[from] nattka_rs::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("Missing argument: {0}")]
	MissingArgument(&'static str),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}
