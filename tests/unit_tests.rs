use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use infraod_prep::adapters::{scan_source, YoloImporter};
use infraod_prep::config::DatasetKind;
use infraod_prep::{
    process_camel, process_datasets, DatasetSplitter, LabelRow, LabelTable, PrepConfig,
    PrepError, Split,
};

fn touch(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn write_camel_sequence(root: &Path, sequence: u32, frames: u32, labels: &str) {
    let seq_dir = root.join(format!("Camel_data/images/Sequence-{}", sequence));
    for frame in 1..=frames {
        touch(&seq_dir.join(format!("{}.jpg", frame)), "jpg");
    }
    touch(
        &root.join(format!("Camel_data/labels/Seq{}-IR.txt", sequence)),
        labels,
    );
}

fn stems(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            e.unwrap()
                .path()
                .file_stem()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

fn camel_fixture(root: &Path) {
    let mut labels = String::new();
    for frame in 1..=12 {
        let class = if frame % 3 == 0 { 3 } else { 1 };
        labels.push_str(&format!("{}\t1\t{}\t{}\t20\t40\t30\n", frame, class, frame * 10));
    }
    // Degenerate box: frame 6's second object is dropped by the normalizer.
    labels.push_str("6\t2\t1\t5\t5\t0\t10\n");
    // Box running off the right edge gets clamped when written.
    labels.push_str("7\t3\t3\t320\t200\t40\t30\n");
    write_camel_sequence(root, 1, 12, &labels);

    write_camel_sequence(root, 2, 8, "1 1 1 0 0 10 10\n2 1 3 5 5 20 20\n8 1 1 1 1 2 2\n");
}

#[test]
fn camel_pipeline_partitions_every_labelled_image() {
    let dir = tempfile::tempdir().unwrap();
    camel_fixture(dir.path());
    let config = PrepConfig::rooted_at(dir.path());

    let summary = process_camel(&config).unwrap();

    // Twelve frames in sequence 1 plus frames 1, 2 and 8 of sequence 2 carry labels.
    let n = 15;
    assert_eq!(summary.total(), n);
    assert_eq!(summary.train, (n as f64 * 0.8).floor() as usize);
    assert_eq!(summary.val, (n as f64 * 0.1).floor() as usize);
    assert_eq!(summary.rows_dropped, 1);
    assert!(summary.clamped_values >= 1);

    let dataset = config.dataset();
    let mut seen = BTreeSet::new();
    for split in Split::ALL {
        let labels = stems(&dataset.join("labels").join(split.as_str()));
        let images = stems(&dataset.join("images").join(split.as_str()));
        assert_eq!(labels, images);
        assert_eq!(labels.len(), summary.split_count(split));
        for stem in labels {
            assert!(seen.insert(stem), "image appears in two splits");
        }
    }
    // Frames 3..7 of sequence 2 (ids 15..19) have no labels and are left out.
    let expected: BTreeSet<String> = (1..=14).chain([20]).map(|id| id.to_string()).collect();
    assert_eq!(seen, expected);

    for split in Split::ALL {
        for entry in fs::read_dir(dataset.join("labels").join(split.as_str())).unwrap() {
            let content = fs::read_to_string(entry.unwrap().path()).unwrap();
            assert!(!content.is_empty());
            for line in content.lines() {
                let fields: Vec<&str> = line.split_whitespace().collect();
                assert_eq!(fields.len(), 5);
                assert!(fields[0] == "0" || fields[0] == "1");
                for value in &fields[1..] {
                    let v: f64 = value.parse().unwrap();
                    assert!((0.0..=1.0).contains(&v), "{} out of range in {}", v, line);
                }
            }
        }
    }

    assert!(config.camel_labels().join("ALL_LABELS.txt").is_file());
}

#[test]
fn splitter_fails_hard_when_pool_image_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let config = PrepConfig::rooted_at(dir.path());
    let pool = config.pool();
    fs::create_dir_all(&pool).unwrap();
    fs::write(pool.join("1.jpg"), b"jpg").unwrap();
    fs::write(pool.join("2.png"), b"png").unwrap();

    let table = LabelTable::training(vec![
        LabelRow::new(1, 10.0, 20.0, 40.0, 30.0, 0).unwrap(),
        LabelRow::new(2, 10.0, 20.0, 40.0, 30.0, 1).unwrap(),
        LabelRow::new(3, 10.0, 20.0, 40.0, 30.0, 1).unwrap(),
    ]);
    let splitter = DatasetSplitter::new(&config, &table);

    assert_eq!(
        splitter.find_pool_image(2).unwrap(),
        pool.join("2.png")
    );
    let err = splitter.split_and_save_with(1.0, 0.0).unwrap_err();
    assert!(matches!(err, PrepError::ImageNotFound { image_id: 3, .. }));
    assert!(!config.dataset().join("labels/train/3.txt").exists());
}

#[test]
fn llvip_without_test_labels_completes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("LLVIP_data");
    for i in 0..10 {
        touch(&root.join(format!("train/images/0100{:02}.jpg", i)), "img");
        touch(
            &root.join(format!("train/labels/0100{:02}.txt", i)),
            "0 0.5 0.5 0.1 0.2\n",
        );
    }
    touch(&root.join("test/images/190001.jpg"), "img");

    let config = PrepConfig::rooted_at(dir.path());
    let importer = YoloImporter::llvip(&config);
    let scan = scan_source(importer.source()).unwrap();
    assert_eq!(scan.label_counts["test"], 0);
    assert_eq!(scan.missing_dirs, 1);

    let summary = importer.process().unwrap();
    assert_eq!(summary.total(), 10);
    assert_eq!(summary.train, 8);
    assert_eq!(summary.val, 1);
    assert_eq!(summary.test, 1);
    assert_eq!(summary.unmatched_images, 1);

    let copied = fs::read_to_string(
        fs::read_dir(config.dataset().join("labels/train"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path(),
    )
    .unwrap();
    assert_eq!(copied, "0 0.5 0.5 0.1 0.2\n");
}

#[test]
fn llvip_with_nothing_to_import_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = PrepConfig::rooted_at(dir.path());
    let summary = YoloImporter::llvip(&config).process().unwrap();
    assert_eq!(summary.total(), 0);
    assert_eq!(summary.missing_dirs, 4);
}

#[test]
fn hituav_pools_all_source_splits() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("HitUAV_data");
    touch(&root.join("dataset.yaml"), "nc: 2\nnames: ['Person', 'Car']\n");
    for (split, count) in [("train", 6), ("val", 2), ("test", 2)] {
        for i in 0..count {
            let stem = format!("{}_{}", split, i);
            touch(&root.join(format!("images/{}/{}.jpg", split, stem)), "img");
            touch(&root.join(format!("labels/{}/{}.txt", split, stem)), "1 0.2 0.2 0.1 0.1\n");
        }
    }
    touch(&root.join("labels/val/orphan.txt"), "0 0.5 0.5 0.1 0.1\n");

    let config = PrepConfig::rooted_at(dir.path());
    let summary = YoloImporter::hituav(&config).process().unwrap();
    assert_eq!((summary.train, summary.val, summary.test), (8, 1, 1));
    assert_eq!(summary.unmatched_labels, 1);

    let labels: BTreeSet<String> = Split::ALL
        .iter()
        .flat_map(|split| stems(&config.dataset().join("labels").join(split.as_str())))
        .collect();
    assert_eq!(labels.len(), 10);
    assert!(labels.iter().any(|stem| stem.starts_with("test_")));
}

#[test]
fn all_datasets_share_one_tree_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    camel_fixture(dir.path());
    touch(&dir.path().join("LLVIP_data/train/images/010001.jpg"), "img");
    touch(
        &dir.path().join("LLVIP_data/train/labels/010001.txt"),
        "0 0.5 0.5 0.1 0.2\n",
    );

    let config = PrepConfig::rooted_at(dir.path());
    let summaries = process_datasets(&config, DatasetKind::All, true).unwrap();
    assert_eq!(summaries.len(), 3);

    let total_images: usize = Split::ALL
        .iter()
        .map(|split| stems(&config.dataset().join("images").join(split.as_str())).len())
        .sum();
    assert_eq!(total_images, 16);

    let manifest = fs::read_to_string(config.dataset().join("dataset.yaml")).unwrap();
    assert!(manifest.contains("nc: 3"));
    assert!(manifest.contains("0: Person"));
    assert!(manifest.contains("1: Car"));
}

#[test]
fn later_datasets_never_replace_earlier_samples() {
    let dir = tempfile::tempdir().unwrap();
    write_camel_sequence(dir.path(), 1, 1, "1 1 1 10 20 40 30\n");
    let hituav = dir.path().join("HitUAV_data");
    touch(&hituav.join("images/train/1.jpg"), "hituav-img");
    touch(&hituav.join("labels/train/1.txt"), "3 0.9 0.9 0.1 0.1\n");
    touch(&hituav.join("images/train/2.jpg"), "hituav-img");
    touch(&hituav.join("labels/train/2.txt"), "3 0.9 0.9 0.1 0.1\n");

    let mut config = PrepConfig::rooted_at(dir.path());
    config.train_ratio = 1.0;
    config.val_ratio = 0.0;
    let summaries = process_datasets(&config, DatasetKind::All, true).unwrap();

    let hituav_summary = &summaries[2];
    assert_eq!(hituav_summary.collisions, 1);
    assert_eq!(hituav_summary.train, 1);

    let train = config.dataset().join("images/train");
    assert_eq!(fs::read_to_string(train.join("1.jpg")).unwrap(), "jpg");
    let label = fs::read_to_string(config.dataset().join("labels/train/1.txt")).unwrap();
    assert!(label.starts_with("0 "));
    assert_eq!(fs::read_to_string(train.join("2.jpg")).unwrap(), "hituav-img");
}

#[test]
fn rerun_with_another_seed_keeps_each_stem_in_one_split() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("LLVIP_data");
    for i in 0..20 {
        touch(&root.join(format!("train/images/0100{:02}.jpg", i)), "img");
        touch(
            &root.join(format!("train/labels/0100{:02}.txt", i)),
            "0 0.5 0.5 0.1 0.2\n",
        );
    }

    let mut config = PrepConfig::rooted_at(dir.path());
    process_datasets(&config, DatasetKind::Llvip, false).unwrap();
    config.seed = 7;
    let rerun = process_datasets(&config, DatasetKind::Llvip, false).unwrap();
    assert_eq!(rerun[0].total(), 0);
    assert_eq!(rerun[0].collisions, 20);

    let mut seen = BTreeSet::new();
    for split in Split::ALL {
        for stem in stems(&config.dataset().join("labels").join(split.as_str())) {
            assert!(seen.insert(stem.clone()), "{} appears in two splits", stem);
        }
    }
    assert_eq!(seen.len(), 20);
}

#[test]
fn hituav_manifest_lists_its_own_classes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("HitUAV_data");
    touch(
        &root.join("dataset.yaml"),
        "nc: 5\nnames:\n  0: Person\n  1: Car\n  2: Bicycle\n  3: OtherVehicle\n  4: DontCare\n",
    );
    touch(&root.join("images/train/a.jpg"), "img");
    touch(&root.join("labels/train/a.txt"), "4 0.5 0.5 0.1 0.1\n");

    let config = PrepConfig::rooted_at(dir.path());
    process_datasets(&config, DatasetKind::Hituav, true).unwrap();

    let manifest = fs::read_to_string(config.dataset().join("dataset.yaml")).unwrap();
    assert!(manifest.contains("nc: 5"));
    assert!(manifest.contains("3: OtherVehicle"));
    assert!(manifest.contains("4: DontCare"));
}
