use approx::assert_relative_eq;
use geotemp::core::grid_sampler::{compute_grid_spec, GridSampler};
use geotemp::core::validation::TemperatureValidator;
use geotemp::{sample, Band, GeoTransform, RasterStack, SamplingMode, ThermalError};
use ndarray::{s, Array2};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn validated_stack(data: Array2<f32>) -> (RasterStack, geotemp::core::ValidationReport) {
    let band = Band::new(1, data);
    let report = TemperatureValidator::default().validate(&band, 1.0);
    let stack = RasterStack::new(vec![band], GeoTransform::identity()).expect("Failed to build stack");
    (stack, report)
}

#[test]
fn test_large_image_neighborhood_average() {
    init_logging();

    let grid = compute_grid_spec(5000, 5000, None);
    assert_eq!(grid.cell_size, 40);
    assert_eq!((grid.grid_cols, grid.grid_rows), (125, 125));

    // Only the clicked cell (62, 62) and three of its neighbors hold data
    let mut data = Array2::from_elem((5000, 5000), f32::NAN);
    data.slice_mut(s![2480..2520, 2480..2520]).fill(10.0);
    data.slice_mut(s![2440..2480, 2480..2520]).fill(20.0);
    data.slice_mut(s![2480..2520, 2440..2480]).fill(30.0);
    data.slice_mut(s![2520..2560, 2520..2560]).fill(40.0);
    let (stack, report) = validated_stack(data);

    let result = sample(&stack, &report, 2500, 2500).expect("Failed to sample");
    assert_relative_eq!(result.temperature_celsius, 25.0);
    assert!(!result.was_interpolated);

    let stats = result.neighborhood.expect("Neighborhood statistics missing");
    assert_eq!(stats.cells_used, 4);
    assert_eq!(stats.pixel_count, 4 * 1600);
    assert_relative_eq!(stats.min, 10.0);
    assert_relative_eq!(stats.max, 40.0);
    assert_relative_eq!(stats.std_dev, 125.0f64.sqrt(), epsilon = 1e-9);

    // Cell mode ignores the neighbors
    let cell = GridSampler::standard()
        .with_mode(SamplingMode::Cell)
        .sample(&stack, &report, 2500, 2500)
        .unwrap();
    assert_relative_eq!(cell.temperature_celsius, 10.0);
}

#[test]
fn test_no_valid_neighbors() {
    init_logging();

    let mut data = Array2::from_elem((200, 200), -9999.0f32);
    data.slice_mut(s![0..10, 0..10]).fill(15.0);
    let (stack, report) = validated_stack(data);

    // ceil(0.2 * 200) = 40px search limit; nearest data is ~269px away
    let err = sample(&stack, &report, 199, 199).unwrap_err();
    assert_eq!(err.user_message(), "No data available at this location");
    match err {
        ThermalError::NoValidNeighbors { row, col, max_radius } => {
            assert_eq!((row, col), (199, 199));
            assert_eq!(max_radius, 40);
        }
        other => panic!("unexpected error: {}", other),
    }

    // Close to the data block the cell average still answers
    let near = sample(&stack, &report, 12, 12).unwrap();
    assert_relative_eq!(near.temperature_celsius, 15.0);
}

#[test]
fn test_geocoordinates_follow_transform() {
    init_logging();

    let band = Band::new(1, Array2::from_elem((50, 50), 21.0f32));
    let report = TemperatureValidator::default().validate(&band, 1.0);
    let gt = GeoTransform::from_gdal([-120.0, 0.001, 0.0, 38.0, 0.0, -0.001]);
    let stack = RasterStack::new(vec![band], gt).unwrap();

    let result = sample(&stack, &report, 10, 20).unwrap();
    assert_relative_eq!(result.longitude, -120.0 + 20.5 * 0.001, epsilon = 1e-12);
    assert_relative_eq!(result.latitude, 38.0 - 10.5 * 0.001, epsilon = 1e-12);
}
