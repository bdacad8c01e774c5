//! SMR Benchmark Driver
//!
//! Runs throughput measurements for the reclamation primitives and their
//! helpers. Narrative output goes to stderr; machine-readable `name,value`
//! pairs go to stdout.
//!
//! Usage: `smr_bench [--thread_num=<N>] [--workload=<W>] [switches]`
//!
//! - `--thread_num=<N>`: worker count (default: hardware concurrency)
//! - `--workload=<W>`: synthetic work units per operation (default: 0)
//!
//! Switches select individual benchmarks; with none given, all run:
//! `--thread_affinity`, `--int_hash`, `--random_number`, `--lem_simple`,
//! `--gem_simple`.
//!
//! Exit code 0 on success, 1 on a malformed numeric argument.

use std::process;
use std::sync::Mutex;
use std::time::Instant;

use quiesce_benchmarks::args::Argv;
use quiesce_benchmarks::{affinity, run_threads, workload};
use quiesce_memory::{GlobalWriteEm, LocalWriteEm};

/// Iterations per thread in the announcement loops.
const EM_ITERATIONS: u64 = 30 * 1024 * 1024;

/// Iterations in the single-thread helper loops.
const HELPER_ITERATIONS: u64 = 10_000_000;

struct Config {
    thread_num: u64,
    workload: u64,
}

fn main() {
    let args = Argv::from_env();

    let thread_num = match args.parsed::<u64>("thread_num") {
        Ok(value) => value.unwrap_or(affinity::core_count() as u64),
        Err(err) => {
            eprintln!("malformed value for thread_num: {err}");
            process::exit(1);
        }
    };
    let work_units = match args.parsed::<u64>("workload") {
        Ok(value) => value.unwrap_or(0),
        Err(err) => {
            eprintln!("malformed value for workload: {err}");
            process::exit(1);
        }
    };

    let config = Config {
        thread_num,
        workload: work_units,
    };

    eprintln!("# quiesce SMR benchmark driver");
    eprintln!("Date: {}", chrono::Local::now().to_rfc2822());
    eprintln!(
        "threads = {}, workload = {}, cores = {}\n",
        config.thread_num,
        config.workload,
        affinity::core_count()
    );

    let switches = [
        "thread_affinity",
        "int_hash",
        "random_number",
        "lem_simple",
        "gem_simple",
    ];
    let run_all = !switches.iter().any(|switch| args.has(switch));
    let selected = |switch: &str| run_all || args.has(switch);

    if selected("thread_affinity") {
        thread_affinity_benchmark();
    }
    if selected("int_hash") {
        int_hash_benchmark();
    }
    if selected("random_number") {
        random_number_benchmark();
    }
    if selected("lem_simple") {
        lem_simple_benchmark(&config);
    }
    if selected("gem_simple") {
        gem_simple_benchmark(&config);
    }
}

fn print_benchmark_name(name: &str) {
    eprintln!("========== {name} ==========");
}

/// How fast the current-core query itself is.
fn thread_affinity_benchmark() {
    print_benchmark_name("thread_affinity");

    let start = Instant::now();
    let mut last = 0i32;
    for _ in 0..HELPER_ITERATIONS {
        last = affinity::current_core();
    }
    let elapsed = start.elapsed();
    std::hint::black_box(last);

    let rate = HELPER_ITERATIONS as f64 / elapsed.as_secs_f64();
    eprintln!("    {HELPER_ITERATIONS} queries in {elapsed:?}");
    eprintln!("    throughput = {rate:.0} op/s\n");
    println!("thread_affinity,{rate:.0}");
}

fn int_hash_benchmark() {
    print_benchmark_name("int_hash");

    let start = Instant::now();
    let mut accumulator = 0u64;
    for i in 0..HELPER_ITERATIONS {
        accumulator = accumulator.wrapping_add(workload::mix64(i));
    }
    let elapsed = start.elapsed();
    std::hint::black_box(accumulator);

    let rate = HELPER_ITERATIONS as f64 / elapsed.as_secs_f64();
    eprintln!("    throughput = {rate:.0} hash/s\n");
    println!("int_hash,{rate:.0}");
}

fn random_number_benchmark() {
    print_benchmark_name("random_number");

    let random = workload::HashRandom::new(10, 1000);
    let start = Instant::now();
    let mut accumulator = 0u64;
    for i in 0..HELPER_ITERATIONS {
        accumulator = accumulator.wrapping_add(random.at(i, 0));
    }
    let elapsed = start.elapsed();
    std::hint::black_box(accumulator);

    let rate = HELPER_ITERATIONS as f64 / elapsed.as_secs_f64();
    eprintln!("    throughput = {rate:.0} draw/s\n");
    println!("random_number,{rate:.0}");
}

/// Announcement storm on the local-write manager: every thread hammers its
/// own slot while the internal collector cycles in the background.
fn lem_simple_benchmark(config: &Config) {
    print_benchmark_name("lem_simple");

    let core_count = affinity::core_count();
    let em: LocalWriteEm<u64> = LocalWriteEm::new(core_count);
    em.start_collector();

    let per_thread_rates = Mutex::new(Vec::new());

    run_threads(config.thread_num, |thread_id| {
        let core_id = thread_id as usize % core_count;
        affinity::pin_to_core(core_id);

        let start = Instant::now();
        let mut accumulator = 0u64;
        for _ in 0..EM_ITERATIONS {
            em.announce_enter(core_id);
            accumulator = accumulator.wrapping_add(workload::spin_work(config.workload));
        }
        let elapsed = start.elapsed();
        std::hint::black_box(accumulator);

        let rate = EM_ITERATIONS as f64 / elapsed.as_secs_f64();
        match per_thread_rates.lock() {
            Ok(mut rates) => rates.push(rate),
            Err(poisoned) => poisoned.into_inner().push(rate),
        }
    });

    let rates = match per_thread_rates.into_inner() {
        Ok(rates) => rates,
        Err(poisoned) => poisoned.into_inner(),
    };
    let mean = rates.iter().sum::<f64>() / rates.len() as f64;

    eprintln!("    epoch counter reached {}", em.current_epoch());
    eprintln!(
        "    {:.2} M announce/s/thread across {} threads\n",
        mean / 1e6,
        rates.len()
    );
    println!("lem_simple,{mean:.0}");

    drop(em);
}

/// Enter/leave churn on the global-write manager; the shared counter is the
/// bottleneck this benchmark exists to show.
fn gem_simple_benchmark(config: &Config) {
    print_benchmark_name("gem_simple");

    let em: GlobalWriteEm<u64> = GlobalWriteEm::new();
    em.start_collector();

    let per_thread_rates = Mutex::new(Vec::new());

    run_threads(config.thread_num, |thread_id| {
        affinity::pin_to_core(thread_id as usize % affinity::core_count());

        let start = Instant::now();
        let mut accumulator = 0u64;
        for _ in 0..EM_ITERATIONS {
            let _guard = em.enter();
            accumulator = accumulator.wrapping_add(workload::spin_work(config.workload));
        }
        let elapsed = start.elapsed();
        std::hint::black_box(accumulator);

        let rate = EM_ITERATIONS as f64 / elapsed.as_secs_f64();
        match per_thread_rates.lock() {
            Ok(mut rates) => rates.push(rate),
            Err(poisoned) => poisoned.into_inner().push(rate),
        }
    });

    let rates = match per_thread_rates.into_inner() {
        Ok(rates) => rates,
        Err(poisoned) => poisoned.into_inner(),
    };
    let mean = rates.iter().sum::<f64>() / rates.len() as f64;

    eprintln!(
        "    epochs created = {}, freed = {}",
        em.epochs_created(),
        em.epochs_freed()
    );
    eprintln!(
        "    {:.2} M enter-leave/s/thread across {} threads\n",
        mean / 1e6,
        rates.len()
    );
    println!("gem_simple,{mean:.0}");

    drop(em);
}
