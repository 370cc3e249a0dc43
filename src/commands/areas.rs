use eventsync::config::Config;

pub fn areas(config: &Config) {
    println!("Configured target areas");
    println!("=======================");

    for (i, area) in config.areas.iter().enumerate() {
        println!(
            "{}. {:<16} {} ({})",
            i + 1,
            area.area_key,
            area.display_city,
            area.display_country
        );
    }

    if config.areas.is_empty() {
        println!("(none)");
    }
}
