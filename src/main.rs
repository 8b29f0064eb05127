//!
//! stowage CLI
//! -----------
//! Serve, store and address content from a local storage root.

use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use stowage::config::StowageConfig;
use stowage::{AppError, ContentService, FilterParams, FilterRegistry, Identifier};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} get <path> [--root <dir>] [--param <key=value>]... [--out <file>] [--estimate]\n  {program} put <file> [--root <dir>] [--name <name>]\n  {program} info <path> [--root <dir>] [--param <key=value>]...\n  {program} ids <count>\n  {program} shard <id>\n\nFlags:\n  --root <dir>           Storage root (default: $STOWAGE_ROOT or ./data)\n  --param <key=value>    Request parameter, repeatable (filterType, entryName, maxDepth, ...)\n  --out <file>           Write content to a file instead of stdout\n  --estimate             Print the estimated size instead of streaming\n  --name <name>          Stored file name (default: source file name)\n  -h, --help             Show this help\n\nExamples:\n  {program} get stacks/run1 --param maxDepth=-1 --param alwaysArchive=true --out run1.tar\n  {program} get archives/a.zip --param filterType=ZIP_ENTRY --param entryName=data.raw\n  {program} put scan.tif"
    );
}

struct Flags {
    positional: Vec<String>,
    root: Option<String>,
    params: Vec<(String, String)>,
    out: Option<String>,
    name: Option<String>,
    estimate: bool,
}

fn parse_flags(args: &[String]) -> Result<Flags> {
    let mut f = Flags { positional: Vec::new(), root: None, params: Vec::new(), out: None, name: None, estimate: false };
    let mut i = 0;
    while i < args.len() {
        let a = args[i].as_str();
        let mut value = || -> Result<String> {
            i += 1;
            args.get(i).cloned().ok_or_else(|| anyhow!("missing value for {}", a))
        };
        match a {
            "--root" => f.root = Some(value()?),
            "--out" => f.out = Some(value()?),
            "--name" => f.name = Some(value()?),
            "--param" => {
                let kv = value()?;
                let (k, v) = kv.split_once('=').ok_or_else(|| anyhow!("--param expects key=value, got '{}'", kv))?;
                f.params.push((k.to_string(), v.to_string()));
            }
            "--estimate" => f.estimate = true,
            other if other.starts_with("--") => bail!("unknown flag {}", other),
            other => f.positional.push(other.to_string()),
        }
        i += 1;
    }
    Ok(f)
}

fn cmd_get(cfg: &StowageConfig, svc: &ContentService, flags: &Flags) -> Result<()> {
    let path = flags.positional.first().map(String::as_str).unwrap_or("");
    let mut params = FilterParams::from_pairs(flags.params.iter().cloned()).map_err(AppError::from)?;
    if cfg.always_archive && !params.always_archive() {
        params = params.with_always_archive(true);
    }
    let resolver = cfg.resolver();
    if flags.estimate {
        let nodes = stowage::PathResolver::resolve(&resolver, path, &params).map_err(AppError::from)?;
        let size = svc.estimate_size(&params, &nodes).map_err(AppError::from)?;
        println!("{}", size);
        return Ok(());
    }
    let written = match &flags.out {
        Some(file) => {
            let mut out = BufWriter::new(File::create(file).with_context(|| format!("creating {}", file))?);
            let n = svc.serve(&resolver, path, &params, &mut out).map_err(AppError::from)?;
            out.flush()?;
            n
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            svc.serve(&resolver, path, &params, &mut out).map_err(AppError::from)?
        }
    };
    info!(target: "stowage", path, bytes = written, "get complete");
    Ok(())
}

fn cmd_info(cfg: &StowageConfig, svc: &ContentService, flags: &Flags) -> Result<()> {
    let path = flags.positional.first().map(String::as_str).unwrap_or("");
    let params = FilterParams::from_pairs(flags.params.iter().cloned()).map_err(AppError::from)?;
    let nodes = stowage::PathResolver::resolve(&cfg.resolver(), path, &params).map_err(AppError::from)?;
    for node in &nodes {
        let meta = svc.tiff_metadata(node).map_err(AppError::from)?;
        let line = serde_json::json!({
            "key": node.object_key(),
            "size": meta.size(),
            "sx": meta.sx,
            "sy": meta.sy,
            "sz": meta.sz,
            "bytesPerPixel": meta.bytes_per_pixel,
        });
        println!("{}", line);
    }
    Ok(())
}

fn cmd_put(cfg: &StowageConfig, svc: &ContentService, flags: &Flags) -> Result<()> {
    let src = flags.positional.first().ok_or_else(|| anyhow!("put requires a source file"))?;
    let name = match &flags.name {
        Some(n) => n.clone(),
        None => std::path::Path::new(src)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("cannot derive a name from '{}'", src))?,
    };
    let mut file = File::open(src).with_context(|| format!("opening {}", src))?;
    let store = cfg.content_store(svc.ids().clone());
    let stored = store.put(&name, &mut file).map_err(AppError::from)?;
    println!("{}\t{}\t{}\t{}", stored.id, stored.transfer.bytes_written, stored.transfer.checksum_hex(), stored.path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "stowage".to_string());
    if args.len() < 2 || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage(&program);
        return Ok(());
    }

    let mut cfg = StowageConfig::load()?;
    let flags = parse_flags(&args[2..])?;
    if let Some(root) = &flags.root {
        cfg.storage_root = root.into();
    }
    info!(target: "stowage", root = %cfg.storage_root.display(), context = cfg.deployment_context, "stowage starting");

    let ids = Arc::new(cfg.id_generator());
    let svc = ContentService::new(Arc::new(FilterRegistry::standard()), ids);

    match args[1].as_str() {
        "get" => cmd_get(&cfg, &svc, &flags),
        "put" => cmd_put(&cfg, &svc, &flags),
        "info" => cmd_info(&cfg, &svc, &flags),
        "ids" => {
            let n: usize = match flags.positional.first() {
                Some(s) => s.parse().with_context(|| format!("invalid count '{}'", s))?,
                None => 1,
            };
            for id in svc.next_ids(n) {
                println!("{}", id);
            }
            Ok(())
        }
        "shard" => {
            let id = flags.positional.first().ok_or_else(|| anyhow!("shard requires an id"))?;
            let id: Identifier = id.parse().with_context(|| format!("invalid id '{}'", id))?;
            println!("{}", svc.shard_path(&id.to_string()).join("/"));
            Ok(())
        }
        other => {
            print_usage(&program);
            bail!("unknown command '{}'", other)
        }
    }
}
