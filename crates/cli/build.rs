use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("gleaner")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gleaner Contributors")
        .about("Extract structured records from news pages")
        .arg(clap::arg!(<INPUT> "URL to fetch, local HTML file, or '-' for stdin"))
        .arg(clap::arg!(--url <URL> "Source URL of file or stdin input (selects the publisher's rules)"))
        .arg(
            clap::arg!(-s --shape <SHAPE> "Record shape to extract")
                .default_value("article")
                .value_parser(["article", "story", "video", "audio"]),
        )
        .arg(
            clap::arg!(--rules_dir <DIR> "Directory of per-domain rule files to teach before parsing")
                .value_name("DIR")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            clap::arg!(--save_rules <DIR> "Write the selector cache to this directory after parsing")
                .value_name("DIR")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--candidates "Print discovery candidates for every field instead of extracting"))
        .arg(clap::arg!(--fallback "Ask a chat-completions model for fields structure cannot fill"))
        .arg(clap::arg!(--model <MODEL> "Model used by --fallback"))
        .arg(clap::arg!(--endpoint <URL> "OpenAI-compatible API base URL used by --fallback"))
        .arg(
            clap::arg!(-f --format <FORMAT> "Output format (json, text)")
                .value_name("FORMAT")
                .default_value("json")
                .value_parser(["json", "text"]),
        )
        .arg(
            clap::arg!(-o --output <FILE> "Output file (default: stdout)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--timeout <SECS> "HTTP timeout in seconds").default_value("30"))
        .arg(clap::arg!(--user_agent <UA> "Custom User-Agent for HTTP requests").value_name("UA"))
        .arg(clap::arg!(-v --verbose "Enable debug logging"));

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "gleaner", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "gleaner", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "gleaner", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "gleaner", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
