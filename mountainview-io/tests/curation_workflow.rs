use approx::assert_relative_eq;
use mountainview_core::{build_multiscale, Firings};
use mountainview_io::{
    load_firings, open_multiscale_timeseries, MdaDataType, MdaReader, MdaWriter, Session,
};
use ndarray::Array2;
use tempfile::tempdir;

#[test]
fn multiscale_file_matches_raw_extrema() {
    let dir = tempdir().unwrap();
    let raw_path = dir.path().join("raw.mda");
    let ms_path = dir.path().join("raw.multiscale.mda");

    #[allow(clippy::cast_precision_loss)]
    let raw = Array2::from_shape_fn((4, 1000), |(m, t)| {
        ((t * 31 + m * 7) % 97) as f64 - 48.0
    });
    MdaWriter::write_array2(&raw_path, &raw, MdaDataType::Float32).unwrap();

    let reader = MdaReader::open(&raw_path).unwrap();
    let ms = build_multiscale(&reader).unwrap();
    MdaWriter::write_array2(&ms_path, &ms, MdaDataType::Float32).unwrap();

    let ts = open_multiscale_timeseries(&raw_path, Some(ms_path.as_path())).unwrap();
    assert_eq!(ts.num_channels(), 4);
    assert_eq!(ts.num_timepoints(), 1000);

    // Downsampled point 5 at factor 9 summarises raw timepoints 45..54.
    let env = ts.get_data(5, 5, 9).unwrap();
    for m in 0..4 {
        let window = raw.row(m);
        let window = window.slice(ndarray::s![45..54]);
        let lo = window.fold(f64::INFINITY, |a, &v| a.min(v));
        let hi = window.fold(f64::NEG_INFINITY, |a, &v| a.max(v));
        assert_relative_eq!(env.min[[m, 0]], lo);
        assert_relative_eq!(env.max[[m, 0]], hi);
    }

    let (lo, hi) = ts.amplitude_range().unwrap();
    assert_relative_eq!(lo, -48.0);
    assert_relative_eq!(hi, 48.0);
}

#[test]
fn session_merge_relabels_firings() {
    let dir = tempdir().unwrap();
    let firings_path = dir.path().join("firings.mda");
    let session_path = dir.path().join("curation.mv");

    let mut firings = Firings::with_capacity(6);
    for (i, label) in [1, 2, 3, 2, 4, 3].into_iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        firings.push(1, i as f64 * 100.0, label, -50.0);
    }
    MdaWriter::write_array2(&firings_path, &firings.to_array(), MdaDataType::Float64).unwrap();

    let mut session = Session::new();
    session.firings = Some(firings_path.clone());
    session.cluster_merge.merge(&[3, 2]);
    session.tag_cluster(2, "accepted");
    session.save(&session_path).unwrap();

    let session = Session::load(&session_path).unwrap();
    let mut loaded = load_firings(session.firings.as_ref().unwrap()).unwrap();
    assert_eq!(loaded, firings);

    loaded.relabel(&session.cluster_merge.label_map(loaded.k_max()));
    assert_eq!(loaded.labels, vec![1, 2, 2, 2, 4, 2]);
    assert_eq!(loaded.event_counts(), vec![0, 1, 4, 0, 1]);
    assert_eq!(session.cluster_tags(2), vec!["accepted"]);
}
