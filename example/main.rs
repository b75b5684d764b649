use clap::Parser;

use extalloc_gc::{GcContext, GcMode, Heap, MemStats, RootVisitor, SystemExtAllocator};

/// Raw command line arguments.
#[derive(Parser)]
#[command(about)]
pub struct Args {
    /// Number of objects to allocate
    #[arg(long, default_value_t = 10_000)]
    pub objects: usize,

    /// Payload size of each object in bytes
    #[arg(long, default_value_t = 64)]
    pub object_size: usize,

    /// Keep every n-th object reachable through a root (0 keeps nothing)
    #[arg(long, default_value_t = 16)]
    pub keep_every: usize,

    /// Starting heap usage limit, in bytes
    #[arg(long)]
    pub usage_limit: Option<usize>,

    /// Use the leaking variant instead of the tracing one
    #[arg(long, default_value_t = false)]
    pub leaking: bool,
}

/// Roots for the demo: a single global range over the retained addresses.
struct DemoRoots {
    retained: Vec<usize>,
}

impl GcContext for DemoRoots {
    fn visit_stack(&mut self, _visitor: &mut impl RootVisitor) {
        // The demo drives the heap explicitly; there is no machine stack
        // to scan.
    }

    fn visit_globals(&mut self, visitor: &mut impl RootVisitor) {
        if !self.retained.is_empty() {
            let start = self.retained.as_ptr() as usize;
            let end = start + self.retained.len() * size_of::<usize>();
            visitor.visit_range(start, end);
        }
    }
}

fn main() {
    let args = Args::parse();

    let mode = if args.leaking {
        GcMode::Leaking
    } else {
        GcMode::Tracing
    };
    let mut heap = Heap::with_mode(SystemExtAllocator::new(), mode);
    if let Some(limit) = args.usage_limit {
        heap.set_usage_limit(limit);
    }

    let mut roots = DemoRoots {
        retained: Vec::with_capacity(args.objects),
    };

    for index in 0..args.objects {
        let region = heap.alloc(&mut roots, args.object_size);
        if args.keep_every != 0 && index % args.keep_every == 0 {
            roots.retained.push(region.as_ptr() as usize);
        }
    }

    heap.collect(&mut roots);

    let mut stats = MemStats::default();
    heap.read_mem_stats(&mut stats);
    println!(
        "mode={:?} mallocs={} frees={} heap_inuse={} tracked={} usage_limit={}",
        heap.mode(),
        stats.mallocs,
        stats.frees,
        stats.heap_inuse,
        heap.tracked_allocations(),
        heap.usage_limit(),
    );
}
