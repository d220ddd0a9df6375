use nalgebra::{Matrix3, Vector3};
use skyframe::astro::{rotation_matrix, Axis};
use skyframe::{Coordinate, FrameGraphResult, Transform, TransformGraph};
use std::sync::Arc;
use std::time::Instant;

fn main() -> FrameGraphResult<()> {
    println!("Transform Graph Performance Benchmark");
    println!("-------------------------------------");

    // Parameters
    let num_frames: u32 = 100;
    let num_lookups: u32 = 10000;
    let num_threads: u32 = 8;
    let batch_size: u32 = 1000;

    let graph = TransformGraph::new();

    // Set up a chain of transforms: base -> frame1 -> frame2 -> ... -> frameN
    println!("Setting up {num_frames} frames in a chain");
    for i in 0..num_frames {
        let parent = if i == 0 {
            "base".to_string()
        } else {
            format!("frame{i}")
        };
        let child = format!("frame{}", i + 1);

        // Alternate rotations and shifts so the composite stays affine
        let transform = if i % 2 == 0 {
            Transform::static_matrix(&parent, &child, rotation_matrix(0.01, Axis::Z))?
        } else {
            Transform::affine(
                &parent,
                &child,
                Matrix3::identity(),
                Vector3::new(1.0, 0.0, 0.0),
                None,
            )?
        };
        graph.register_transform(transform);
    }

    let target = format!("frame{num_frames}");
    let positions = (0..batch_size)
        .map(|i| Vector3::new(f64::from(i), 1.0, -1.0))
        .collect();
    let coordinate = Coordinate::from_positions("base", positions)?;

    // Warm up the cache
    println!("Warming up cache...");
    for _ in 0..100 {
        graph.transform_to(&coordinate, &target)?;
    }

    // Single-threaded benchmark
    println!("\nSingle-threaded lookup benchmark:");
    let start = Instant::now();
    for _ in 0..num_lookups {
        graph.composite("base", &target)?;
    }
    let elapsed = start.elapsed();
    println!("  {num_lookups} lookups in {elapsed:?}");
    println!("  Avg: {:?} per lookup", elapsed / num_lookups);

    println!("\nSingle-threaded transform of {batch_size} positions:");
    let start = Instant::now();
    for _ in 0..num_lookups / 10 {
        graph.transform_to(&coordinate, &target)?;
    }
    let elapsed = start.elapsed();
    println!("  {} transforms in {elapsed:?}", num_lookups / 10);
    println!("  Avg: {:?} per transform", elapsed / (num_lookups / 10));

    // Multi-threaded benchmark
    println!("\nMulti-threaded lookup benchmark ({num_threads}x threads):");
    let start = Instant::now();

    let graph = Arc::new(graph);
    let lookups_per_thread = num_lookups / num_threads;
    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let graph = Arc::clone(&graph);
            std::thread::spawn(move || -> FrameGraphResult<()> {
                for i in 0..lookups_per_thread {
                    // Mix up the queries across threads to create some cache misses
                    let frame_num = if i % 2 == 0 {
                        num_frames - (t % 10)
                    } else {
                        num_frames
                    };
                    graph.composite("base", &format!("frame{frame_num}"))?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => eprintln!("  a benchmark thread panicked"),
        }
    }

    let elapsed = start.elapsed();
    println!("  {num_lookups} lookups in {elapsed:?}");
    println!("  Avg: {:?} per lookup", elapsed / num_lookups);
    println!("  Cached routes: {}", graph.cached_routes());
    Ok(())
}
